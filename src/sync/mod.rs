//! Synchronization Engine
//!
//! [`SyncEngine`] runs the page loop against the upstream and persists its
//! progress; [`SyncScheduler`] owns the single in-flight run handle that every
//! trigger in the process shares.

mod engine;
mod scheduler;

pub use engine::SyncEngine;
pub use scheduler::{SyncHandle, SyncScheduler};

use crate::state::{RunOutcome, SyncMode};
use crate::storage::StorageError;
use crate::upstream::FetchError;
use serde::Serialize;
use thiserror::Error;

/// Why a synchronization run failed
///
/// Cloneable so that every caller attached to a run receives the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Upstream rate limit persisted after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    UpstreamRejected(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Sync task aborted: {0}")]
    Aborted(String),
}

impl SyncError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl From<FetchError> for SyncError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::RateLimited { attempts } => Self::RateLimited { attempts },
            FetchError::UpstreamUnavailable { .. } => Self::UpstreamUnavailable(e.to_string()),
            FetchError::UpstreamRejected { .. }
            | FetchError::InvalidPayload(_)
            | FetchError::InvalidEndpoint(_)
            | FetchError::Client(_) => Self::UpstreamRejected(e.to_string()),
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

/// Trigger options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Bypass the cooldown and staleness guards and start a fresh full pass
    pub force: bool,

    /// Clear the catalog and all metadata first; implies `force`
    pub reset: bool,
}

impl SyncOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            reset: false,
        }
    }

    pub fn reset() -> Self {
        Self {
            force: true,
            reset: true,
        }
    }
}

/// Summary of a finished (or declined) run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub outcome: RunOutcome,
    pub mode: SyncMode,
    /// First page fetched by this run
    pub start_page: u32,
    /// Pages processed by this run
    pub pages: u32,
    pub raw_rows: u64,
    pub normalized_rows: u64,
    pub last_page: Option<u32>,
    /// Why the scheduling guards declined the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}
