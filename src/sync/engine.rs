//! Sync engine - the resumable page loop
//!
//! A run moves `Idle → Running → {Completed, Interrupted, Failed} → Idle`:
//!
//! 1. Scheduling guards (skipped when forced): the rate-limit cooldown must
//!    have elapsed, and the last completed sync must be stale unless an
//!    interrupted run left a resume cursor.
//! 2. Mode selection: `full` for forced runs and empty stores, otherwise the
//!    persisted mode.
//! 3. The page loop fetches, upserts and persists progress after every page,
//!    so a restart resumes at the next unfetched page.
//!
//! Incremental runs stop at the first page holding nothing newer than the
//! watermark. This assumes the upstream lists the newest records first; an
//! upstream with another ordering can end an incremental run early.

use crate::analytics::CacheVersion;
use crate::config::{SyncConfig, MAX_INTERVAL_SECS};
use crate::extract::{normalize, row_timestamp, DomainRecord};
use crate::state::{format_time, MetaKey, RunOutcome, SyncMode, SyncState};
use crate::storage::{lock_store, SharedStore};
use crate::sync::{SyncError, SyncOptions, SyncReport};
use crate::upstream::PageFetcher;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Everything a run decided before fetching its first page
#[derive(Debug, Clone)]
struct RunPlan {
    mode: SyncMode,
    start_page: u32,
    total_pages: Option<u32>,
    watermark: Option<DateTime<Utc>>,
}

enum Preparation {
    Skip(SyncMode, String),
    Run(RunPlan),
}

/// Progress accumulated by the page loop
#[derive(Debug, Default)]
struct Progress {
    pages: u32,
    raw_rows: u64,
    normalized_rows: u64,
    last_page: Option<u32>,
    total_pages: Option<u32>,
    newest_seen: Option<DateTime<Utc>>,
    wrote_rows: bool,
}

/// Drives synchronization runs against one store
pub struct SyncEngine {
    store: SharedStore,
    fetcher: PageFetcher,
    page_size: u32,
    settings: SyncConfig,
    version: CacheVersion,
}

impl SyncEngine {
    /// Creates an engine
    ///
    /// # Arguments
    ///
    /// * `store` - The catalog store shared with readers
    /// * `fetcher` - The upstream page fetcher
    /// * `page_size` - Rows requested per page
    /// * `settings` - Page budget, delays and guard intervals
    /// * `version` - Cache version bumped after store mutations
    pub fn new(
        store: SharedStore,
        fetcher: PageFetcher,
        page_size: u32,
        settings: SyncConfig,
        version: CacheVersion,
    ) -> Self {
        Self {
            store,
            fetcher,
            page_size: page_size.max(1),
            settings,
            version,
        }
    }

    /// Executes one run
    ///
    /// Callers must not run two of these concurrently against the same store;
    /// [`crate::sync::SyncScheduler`] enforces that.
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReport)` - The run completed, was interrupted by its page
    ///   budget, or was declined by the scheduling guards
    /// * `Err(SyncError)` - A fetch or store write failed; the failure has
    ///   already been persisted
    pub async fn run(&self, options: SyncOptions) -> Result<SyncReport, SyncError> {
        if options.reset {
            lock_store(&self.store)?.reset()?;
            self.version.bump();
            tracing::info!("Catalog reset before sync");
        }

        let force = options.force || options.reset;
        let plan = match self.prepare(force, Utc::now())? {
            Preparation::Run(plan) => plan,
            Preparation::Skip(mode, reason) => {
                tracing::info!("Sync skipped: {}", reason);
                lock_store(&self.store)?.write_meta(&[(
                    MetaKey::LastOutcome,
                    Some(RunOutcome::Skipped.to_db_string().to_string()),
                )])?;
                return Ok(SyncReport {
                    outcome: RunOutcome::Skipped,
                    mode,
                    start_page: 0,
                    pages: 0,
                    raw_rows: 0,
                    normalized_rows: 0,
                    last_page: None,
                    skip_reason: Some(reason),
                });
            }
        };

        tracing::info!(
            "Starting {} sync at page {} (budget {} pages)",
            plan.mode,
            plan.start_page,
            self.settings.max_pages_per_run
        );
        if plan.mode == SyncMode::Incremental {
            tracing::info!(
                "Incremental sync stops at the first page with nothing newer than {} (assumes newest-first upstream ordering)",
                plan.watermark
                    .map(format_time)
                    .unwrap_or_else(|| "an unknown watermark".to_string())
            );
        }

        let mut progress = Progress {
            total_pages: plan.total_pages,
            ..Progress::default()
        };
        let result = self.page_loop(&plan, &mut progress).await;

        let finished = match result {
            Ok(outcome) => self.finish(&plan, &progress, outcome).map(|()| outcome),
            Err(e) => Err(e),
        };

        let bump = progress.wrote_rows || matches!(finished, Ok(RunOutcome::Completed));
        if bump {
            self.version.bump();
        }

        match finished {
            Ok(outcome) => {
                tracing::info!(
                    "Sync {}: {} pages, {} raw rows, {} normalized",
                    outcome,
                    progress.pages,
                    progress.raw_rows,
                    progress.normalized_rows
                );
                Ok(SyncReport {
                    outcome,
                    mode: plan.mode,
                    start_page: plan.start_page,
                    pages: progress.pages,
                    raw_rows: progress.raw_rows,
                    normalized_rows: progress.normalized_rows,
                    last_page: progress.last_page,
                    skip_reason: None,
                })
            }
            Err(e) => {
                tracing::error!("Sync failed after {} pages: {}", progress.pages, e);
                self.record_failure(&e, &progress);
                Err(e)
            }
        }
    }

    /// Applies the scheduling guards and builds the run plan
    fn prepare(&self, force: bool, now: DateTime<Utc>) -> Result<Preparation, SyncError> {
        let mut store = lock_store(&self.store)?;
        let state = SyncState::from_meta(&store.load_meta()?);

        if !force {
            if state.in_cooldown(now) {
                let until = state.next_sync_not_before.map(format_time).unwrap_or_default();
                return Ok(Preparation::Skip(
                    state.sync_mode,
                    format!("rate-limit cooldown until {}", until),
                ));
            }

            let stale_after = interval(self.settings.stale_after_secs);
            if !state.has_resume_cursor() && state.is_fresh(now, stale_after) {
                let last = state.last_sync_at.map(format_time).unwrap_or_default();
                return Ok(Preparation::Skip(
                    state.sync_mode,
                    format!("last sync at {} is still fresh", last),
                ));
            }
        }

        let empty = store.count_records()? == 0;
        let mode = if force || empty {
            SyncMode::Full
        } else {
            state.sync_mode
        };

        let (start_page, total_pages) = if force {
            (1, None)
        } else {
            (state.cursor_page, state.total_pages)
        };

        let watermark = match state.source_created_at_max {
            Some(watermark) => Some(watermark),
            None => {
                let computed = store.max_source_timestamp()?;
                if let Some(watermark) = computed {
                    tracing::debug!("Watermark computed from store: {}", format_time(watermark));
                    store.write_meta(&[(MetaKey::SourceCreatedAtMax, Some(format_time(watermark)))])?;
                }
                computed
            }
        };

        let mut updates = vec![
            (MetaKey::CursorPage, Some(start_page.to_string())),
            (MetaKey::SyncMode, Some(mode.to_db_string().to_string())),
        ];
        if total_pages.is_none() {
            updates.push((MetaKey::TotalPages, None));
        }
        store.write_meta(&updates)?;

        Ok(Preparation::Run(RunPlan {
            mode,
            start_page,
            total_pages,
            watermark,
        }))
    }

    async fn page_loop(
        &self,
        plan: &RunPlan,
        progress: &mut Progress,
    ) -> Result<RunOutcome, SyncError> {
        let delay = Duration::from_millis(self.settings.inter_page_delay_ms);
        let mut page = plan.start_page;

        loop {
            let fetched = self.fetcher.fetch_page(page, self.page_size).await?;

            let records: Vec<DomainRecord> = fetched.rows.iter().filter_map(normalize).collect();
            let page_newest = fetched.rows.iter().filter_map(row_timestamp).max();
            progress.newest_seen = progress.newest_seen.max(page_newest);

            let discovered_total = match progress.total_pages {
                Some(_) => None,
                None => fetched.pages_hint(self.page_size),
            };

            progress.pages += 1;
            progress.raw_rows += fetched.rows.len() as u64;
            progress.normalized_rows += records.len() as u64;
            progress.last_page = Some(page);

            {
                let mut store = lock_store(&self.store)?;
                let written = store.upsert_batch(&records, Utc::now())?;
                progress.wrote_rows |= written > 0;

                let mut updates = vec![
                    (MetaKey::LastPage, Some(page.to_string())),
                    (MetaKey::LastRawRows, Some(progress.raw_rows.to_string())),
                    (MetaKey::LastNormalizedRows, Some(progress.normalized_rows.to_string())),
                    (MetaKey::CursorPage, Some((page + 1).to_string())),
                ];
                if let Some(total) = discovered_total {
                    updates.push((MetaKey::TotalPages, Some(total.to_string())));
                }
                store.write_meta(&updates)?;
            }

            if let Some(total) = discovered_total {
                tracing::debug!("Upstream reports {} pages", total);
                progress.total_pages = Some(total);
            }

            tracing::info!(
                "Page {}: {} raw rows, {} normalized",
                page,
                fetched.rows.len(),
                records.len()
            );

            let reached_total = progress.total_pages.is_some_and(|total| page >= total);
            if reached_total || !fetched.has_more {
                tracing::info!("Reached the end of the upstream catalog at page {}", page);
                return Ok(RunOutcome::Completed);
            }

            if plan.mode == SyncMode::Incremental && !is_newer(page_newest, plan.watermark) {
                tracing::info!("Page {} holds nothing newer than the watermark", page);
                return Ok(RunOutcome::Completed);
            }

            if progress.pages >= self.settings.max_pages_per_run {
                tracing::info!(
                    "Page budget of {} exhausted, resuming at page {} next run",
                    self.settings.max_pages_per_run,
                    page + 1
                );
                return Ok(RunOutcome::Interrupted);
            }

            page += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Persists the end state of a successful run
    fn finish(
        &self,
        plan: &RunPlan,
        progress: &Progress,
        outcome: RunOutcome,
    ) -> Result<(), SyncError> {
        let mut updates = vec![
            (MetaKey::LastOutcome, Some(outcome.to_db_string().to_string())),
            (MetaKey::LastRunPages, Some(progress.pages.to_string())),
            (MetaKey::LastError, None),
        ];

        if outcome == RunOutcome::Completed {
            updates.extend([
                (MetaKey::LastSyncAt, Some(format_time(Utc::now()))),
                (MetaKey::NextSyncNotBefore, None),
                (MetaKey::CursorPage, Some("1".to_string())),
                (MetaKey::TotalPages, None),
                (
                    MetaKey::SyncMode,
                    Some(SyncMode::Incremental.to_db_string().to_string()),
                ),
            ]);

            if let Some(watermark) = plan.watermark.max(progress.newest_seen) {
                updates.push((MetaKey::SourceCreatedAtMax, Some(format_time(watermark))));
            }
        }

        lock_store(&self.store)?.write_meta(&updates)?;
        Ok(())
    }

    /// Persists a failure; errors while doing so are only logged
    fn record_failure(&self, error: &SyncError, progress: &Progress) {
        let mut updates = vec![
            (MetaKey::LastOutcome, Some(RunOutcome::Failed.to_db_string().to_string())),
            (MetaKey::LastRunPages, Some(progress.pages.to_string())),
        ];

        if error.is_rate_limited() {
            let now = Utc::now();
            let not_before = now
                .checked_add_signed(interval(self.settings.rate_limit_cooldown_secs))
                .unwrap_or(now);
            updates.push((MetaKey::NextSyncNotBefore, Some(format_time(not_before))));
            updates.push((
                MetaKey::LastError,
                Some(format!(
                    "Upstream rate limit reached; automatic sync paused until {}",
                    format_time(not_before)
                )),
            ));
        } else {
            updates.push((MetaKey::LastError, Some(error.to_string())));
        }

        let persisted = lock_store(&self.store).and_then(|mut store| store.write_meta(&updates));
        if let Err(e) = persisted {
            tracing::error!("Failed to record sync failure: {}", e);
        }
    }
}

/// Converts a configured interval, saturating at [`MAX_INTERVAL_SECS`]
fn interval(secs: u64) -> ChronoDuration {
    let secs = i64::try_from(secs.min(MAX_INTERVAL_SECS)).unwrap_or(i64::MAX);
    ChronoDuration::try_seconds(secs).unwrap_or_else(ChronoDuration::zero)
}

/// Returns true if the page's newest row is newer than the watermark
fn is_newer(page_newest: Option<DateTime<Utc>>, watermark: Option<DateTime<Utc>>) -> bool {
    match (page_newest, watermark) {
        (_, None) => true,
        (Some(newest), Some(watermark)) => newest > watermark,
        (None, Some(_)) => false,
    }
}
