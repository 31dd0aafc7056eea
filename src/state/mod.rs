//! State module for tracking synchronization progress
//!
//! # Components
//!
//! - `SyncMode`: full vs. incremental paging
//! - `RunOutcome`: how a run ended
//! - `SyncState`: the persisted cursor/watermark/error snapshot
//! - `MetaKey`: keys of the metadata table holding that snapshot

mod run_state;
mod sync_state;

// Re-export main types
pub use run_state::{RunOutcome, SyncMode};
pub use sync_state::{format_time, MetaKey, SyncState};
