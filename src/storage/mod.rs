//! Storage module for the catalog
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Last-write-wins upserts of domain records
//! - Filtered, sorted and paginated reads with raw-JSON field lookups
//! - Sync metadata persistence for resumable runs

mod filter_sql;
mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{CatalogStore, StorageError, StorageResult};

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// A store shared between the sync engine and readers
pub type SharedStore = Arc<Mutex<dyn CatalogStore + Send>>;

/// Wraps a store for sharing across tasks
pub fn share(store: impl CatalogStore + Send + 'static) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Locks a shared store, reporting a poisoned lock as an unavailable store
pub fn lock_store(
    store: &SharedStore,
) -> StorageResult<MutexGuard<'_, dyn CatalogStore + Send + 'static>> {
    store
        .lock()
        .map_err(|_| StorageError::Unavailable("store lock poisoned".to_string()))
}

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Aggregates computed by the store for a filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSummary {
    pub total: u64,
    pub available: u64,
    /// Mean of non-null prices
    pub average_price: Option<f64>,
    pub distinct_tlds: u64,
    /// `(tld, count)`, most frequent first
    pub top_tlds: Vec<(String, u64)>,
}
