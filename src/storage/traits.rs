//! Storage traits and error types
//!
//! This module defines the trait interface for catalog store backends and
//! associated error types.

use crate::extract::DomainRecord;
use crate::query::{DomainFilter, DomainSort};
use crate::state::MetaKey;
use crate::storage::FilterSummary;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for catalog store backends
///
/// Filters handed to the query methods are expected to be normalized
/// (see [`DomainFilter::normalized`]). Raw-field lookups must treat the field
/// name as data, never as query text.
pub trait CatalogStore {
    // ===== Records =====

    /// Inserts or fully overwrites each record, keyed by domain
    ///
    /// Every written record gets `updated_at = now`. Returns the number of
    /// records written.
    fn upsert_batch(&mut self, records: &[DomainRecord], now: DateTime<Utc>)
        -> StorageResult<usize>;

    /// Gets a record by domain name
    fn get_record(&self, domain: &str) -> StorageResult<Option<DomainRecord>>;

    /// Counts all stored records
    fn count_records(&self) -> StorageResult<u64>;

    /// Lists every distinct raw field name present, sorted
    fn discover_fields(&self) -> StorageResult<Vec<String>>;

    /// Deletes every record and all sync metadata
    fn reset(&mut self) -> StorageResult<()>;

    // ===== Queries =====

    /// Counts records satisfying the filter
    fn count_matching(&self, filter: &DomainFilter) -> StorageResult<u64>;

    /// Reads one sorted page of records satisfying the filter
    fn select_page(
        &self,
        filter: &DomainFilter,
        sort: &DomainSort,
        limit: u32,
        offset: u64,
    ) -> StorageResult<Vec<DomainRecord>>;

    /// Aggregates counts, average price and TLD frequencies over the filter
    fn summarize(&self, filter: &DomainFilter, top_n: usize) -> StorageResult<FilterSummary>;

    /// Returns `(tld, raw)` for every record satisfying the filter
    fn matching_raw(&self, filter: &DomainFilter)
        -> StorageResult<Vec<(String, Map<String, Value>)>>;

    /// Latest creation/update timestamp found across all stored raw records
    fn max_source_timestamp(&self) -> StorageResult<Option<DateTime<Utc>>>;

    // ===== Sync Metadata =====

    /// Loads every metadata entry
    fn load_meta(&self) -> StorageResult<HashMap<String, String>>;

    /// Gets a single metadata entry
    fn get_meta(&self, key: MetaKey) -> StorageResult<Option<String>>;

    /// Applies metadata updates atomically; `None` deletes the entry
    fn write_meta(&mut self, updates: &[(MetaKey, Option<String>)]) -> StorageResult<()>;
}
