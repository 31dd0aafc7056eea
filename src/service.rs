//! Catalog service - the operations exposed to the UI/API layer
//!
//! Wires the store, the sync scheduler and the analytics engine together:
//!
//! | Operation                 | Method                          |
//! |---------------------------|---------------------------------|
//! | `GetSyncStatus`           | [`CatalogService::sync_status`] |
//! | `TriggerSync`             | [`CatalogService::trigger_sync`] |
//! | `QueryDomains`            | [`CatalogService::query_domains`] |
//! | `GetAnalytics`            | [`CatalogService::analytics`]   |
//! | `ResetCatalog`            | [`CatalogService::reset_catalog`] |

use crate::analytics::{AnalyticsEngine, AnalyticsSnapshot, CacheVersion};
use crate::config::Config;
use crate::query::{self, DomainFilter, DomainQuery, QueryPage};
use crate::state::SyncState;
use crate::storage::{lock_store, open_storage, share, SharedStore};
use crate::sync::{SyncEngine, SyncHandle, SyncOptions, SyncScheduler};
use crate::upstream::{PageFetcher, RetryPolicy};
use crate::{CatalogError, Result};
use std::path::Path;
use std::time::Duration;

/// The catalog service
///
/// Construct once per process; clones of the scheduler inside share the
/// single in-flight sync run.
pub struct CatalogService {
    store: SharedStore,
    scheduler: SyncScheduler,
    analytics: AnalyticsEngine,
    version: CacheVersion,
    auto_refresh: Option<Duration>,
}

impl CatalogService {
    /// Opens the configured store and builds the service
    pub fn open(config: &Config) -> Result<Self> {
        let storage = open_storage(Path::new(&config.storage.database_path))?;
        let policy = RetryPolicy::with_max_attempts(config.sync.max_attempts);
        Self::with_store(config, share(storage), policy)
    }

    /// Builds the service over an existing store with a custom retry policy
    pub fn with_store(config: &Config, store: SharedStore, policy: RetryPolicy) -> Result<Self> {
        let version = CacheVersion::new();
        let fetcher = PageFetcher::new(&config.upstream, policy)?;
        let engine = SyncEngine::new(
            store.clone(),
            fetcher,
            config.upstream.page_size,
            config.sync.clone(),
            version.clone(),
        );

        Ok(Self {
            analytics: AnalyticsEngine::new(store.clone(), version.clone(), &config.analytics),
            scheduler: SyncScheduler::new(engine),
            store,
            version,
            auto_refresh: config.sync.auto_refresh_secs.map(Duration::from_secs),
        })
    }

    /// Starts the auto-refresh loop when one is configured
    pub fn start(&self) {
        if let Some(every) = self.auto_refresh {
            self.scheduler.spawn_auto_refresh(every);
        }
    }

    /// Stops background work and waits for an in-flight run
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Current synchronization state
    pub fn sync_status(&self) -> Result<SyncState> {
        // Slot before store, matching reset_catalog's lock order
        let is_syncing = self.scheduler.is_syncing();
        let store = lock_store(&self.store)?;
        let mut state = SyncState::from_meta(&store.load_meta()?);
        state.record_count = store.count_records()?;
        state.is_syncing = is_syncing;
        Ok(state)
    }

    /// Starts a sync run or attaches to the one in flight
    ///
    /// `reset` clears the catalog and metadata first and implies `force`.
    /// Await the returned handle to observe the outcome.
    pub fn trigger_sync(&self, force: bool, reset: bool) -> SyncHandle {
        self.scheduler.trigger(SyncOptions {
            force: force || reset,
            reset,
        })
    }

    /// One filtered, sorted page of the catalog
    pub fn query_domains(&self, query: &DomainQuery) -> Result<QueryPage> {
        let store = lock_store(&self.store)?;
        Ok(query::query_domains(&*store, query)?)
    }

    /// Aggregates over the records matching `filter`
    pub fn analytics(&self, filter: &DomainFilter) -> Result<AnalyticsSnapshot> {
        Ok(self.analytics.snapshot(filter)?)
    }

    /// Deletes every record and all sync metadata
    ///
    /// Fails with [`CatalogError::SyncInProgress`] while a run is in flight;
    /// triggers arriving during the reset start after it.
    pub fn reset_catalog(&self) -> Result<()> {
        let reset = self.scheduler.while_idle(|| -> Result<()> {
            lock_store(&self.store)?.reset()?;
            self.version.bump();
            Ok(())
        });

        match reset {
            Some(result) => result?,
            None => return Err(CatalogError::SyncInProgress),
        }
        tracing::info!("Catalog reset");
        Ok(())
    }

    pub fn analytics_engine(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }
}
