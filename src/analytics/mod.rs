//! Analytics Engine
//!
//! Aggregates over the same filter predicate as the query engine, served
//! through a cache that is invalidated by [`CacheVersion`] bumps and a TTL.

mod cache;
mod compute;

pub use cache::{CacheVersion, SnapshotCache};
pub use compute::{
    compute_snapshot, flatten_tags, technical_level, TECH_LEVEL_FIELDS, TECH_STACK_FIELDS,
    UNKNOWN_LEVEL,
};

use crate::config::AnalyticsConfig;
use crate::query::{DomainFilter, QueryError};
use crate::storage::{lock_store, SharedStore};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A label and how many records carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

impl LabelCount {
    pub fn new(label: impl Into<String>, count: u64) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

/// TLD × technical-level cross-tabulation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Heatmap {
    /// Top TLDs
    pub rows: Vec<String>,
    /// Top technical levels
    pub columns: Vec<String>,
    /// `cells[row][column]` record counts
    pub cells: Vec<Vec<u64>>,
    /// Largest cell, for normalization
    pub max: u64,
}

/// Aggregates over the records matching one filter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub total: u64,
    pub available: u64,
    /// Mean price, records without a price excluded
    pub average_price: Option<f64>,
    pub distinct_tlds: u64,
    pub top_tlds: Vec<LabelCount>,
    /// Technology tag frequencies, each record counted once per tag
    pub tech_stack: Vec<LabelCount>,
    pub top_levels: Vec<LabelCount>,
    pub heatmap: Heatmap,
}

/// Cached analytics over a shared store
pub struct AnalyticsEngine {
    store: SharedStore,
    version: CacheVersion,
    cache: SnapshotCache,
    top_n: usize,
    computations: AtomicU64,
}

impl AnalyticsEngine {
    pub fn new(store: SharedStore, version: CacheVersion, config: &AnalyticsConfig) -> Self {
        Self {
            store,
            version,
            cache: SnapshotCache::new(Duration::from_secs(config.cache_ttl_secs)),
            top_n: config.top_n.max(1),
            computations: AtomicU64::new(0),
        }
    }

    /// Returns the snapshot for `filter`, computing it on a cache miss
    ///
    /// A hit requires the entry to carry the current cache version and be
    /// younger than the TTL.
    pub fn snapshot(&self, filter: &DomainFilter) -> Result<AnalyticsSnapshot, QueryError> {
        let filter = filter.normalized()?;
        let key = filter.cache_key()?;
        let version = self.version.current();

        if let Some(hit) = self.cache.get(&key, version, Instant::now()) {
            tracing::debug!("Analytics cache hit for [{}] at version {}", key, version);
            return Ok(hit);
        }

        let snapshot = {
            let store = lock_store(&self.store)?;
            compute_snapshot(&*store, &filter, self.top_n)?
        };
        self.computations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "Computed analytics for [{}] at version {}: {} records",
            key,
            version,
            snapshot.total
        );

        self.cache.insert(key, version, Instant::now(), snapshot.clone());
        Ok(snapshot)
    }

    /// Number of snapshots computed (cache misses) so far
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::SeqCst)
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }
}
