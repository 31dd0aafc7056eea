use crate::state::{RunOutcome, SyncMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Keys of the sync metadata table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    LastSyncAt,
    LastError,
    NextSyncNotBefore,
    CursorPage,
    TotalPages,
    LastPage,
    SourceCreatedAtMax,
    SyncMode,
    LastRawRows,
    LastNormalizedRows,
    LastOutcome,
    LastRunPages,
}

impl MetaKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastSyncAt => "last_sync_at",
            Self::LastError => "last_error",
            Self::NextSyncNotBefore => "next_sync_not_before",
            Self::CursorPage => "cursor_page",
            Self::TotalPages => "total_pages",
            Self::LastPage => "last_page",
            Self::SourceCreatedAtMax => "source_created_at_max",
            Self::SyncMode => "sync_mode",
            Self::LastRawRows => "last_raw_rows",
            Self::LastNormalizedRows => "last_normalized_rows",
            Self::LastOutcome => "last_outcome",
            Self::LastRunPages => "last_run_pages",
        }
    }
}

/// Snapshot of the synchronization state
///
/// Everything except `is_syncing` and `record_count` is read back from the
/// metadata table; absent or unparseable entries fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// A run is in flight in this process
    pub is_syncing: bool,

    pub last_sync_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    /// Automatic runs are suppressed until this time
    pub next_sync_not_before: Option<DateTime<Utc>>,

    /// Next page to fetch
    pub cursor_page: u32,

    pub total_pages: Option<u32>,

    pub last_page: Option<u32>,

    /// Incremental watermark
    pub source_created_at_max: Option<DateTime<Utc>>,

    pub sync_mode: SyncMode,

    pub last_raw_rows: Option<u64>,

    pub last_normalized_rows: Option<u64>,

    pub last_outcome: Option<RunOutcome>,

    /// Pages processed by the most recent run
    pub last_run_pages: Option<u32>,

    /// Domains currently in the store
    pub record_count: u64,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            is_syncing: false,
            last_sync_at: None,
            last_error: None,
            next_sync_not_before: None,
            cursor_page: 1,
            total_pages: None,
            last_page: None,
            source_created_at_max: None,
            sync_mode: SyncMode::Full,
            last_raw_rows: None,
            last_normalized_rows: None,
            last_outcome: None,
            last_run_pages: None,
            record_count: 0,
        }
    }
}

impl SyncState {
    /// Builds the persisted part of the state from metadata entries
    pub fn from_meta(meta: &HashMap<String, String>) -> Self {
        let get = |key: MetaKey| meta.get(key.as_str()).map(String::as_str);

        Self {
            last_sync_at: get(MetaKey::LastSyncAt).and_then(parse_time),
            last_error: get(MetaKey::LastError).map(str::to_string),
            next_sync_not_before: get(MetaKey::NextSyncNotBefore).and_then(parse_time),
            cursor_page: get(MetaKey::CursorPage)
                .and_then(|v| v.parse().ok())
                .filter(|page| *page >= 1)
                .unwrap_or(1),
            total_pages: get(MetaKey::TotalPages).and_then(|v| v.parse().ok()),
            last_page: get(MetaKey::LastPage).and_then(|v| v.parse().ok()),
            source_created_at_max: get(MetaKey::SourceCreatedAtMax).and_then(parse_time),
            sync_mode: get(MetaKey::SyncMode)
                .and_then(SyncMode::from_db_string)
                .unwrap_or_default(),
            last_raw_rows: get(MetaKey::LastRawRows).and_then(|v| v.parse().ok()),
            last_normalized_rows: get(MetaKey::LastNormalizedRows).and_then(|v| v.parse().ok()),
            last_outcome: get(MetaKey::LastOutcome).and_then(RunOutcome::from_db_string),
            last_run_pages: get(MetaKey::LastRunPages).and_then(|v| v.parse().ok()),
            ..Self::default()
        }
    }

    /// Returns true while the rate-limit cooldown is active
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.next_sync_not_before
            .map(|not_before| now < not_before)
            .unwrap_or(false)
    }

    /// Returns true if the last completed sync is younger than `stale_after`
    pub fn is_fresh(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        self.last_sync_at
            .map(|last| now - last < stale_after)
            .unwrap_or(false)
    }

    /// Returns true if an interrupted run left a resume cursor behind
    pub fn has_resume_cursor(&self) -> bool {
        self.cursor_page > 1
    }
}

/// Formats a timestamp the way the metadata table stores it
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
