//! Version-gated snapshot cache
//!
//! An entry is served only while both hold: it was computed under the current
//! [`CacheVersion`], and it is younger than the TTL.

use crate::analytics::AnalyticsSnapshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic counter bumped after every store mutation batch
#[derive(Debug, Clone, Default)]
pub struct CacheVersion(Arc<AtomicU64>);

impl CacheVersion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Increments the version and returns the new value
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A cached snapshot and the conditions it was computed under
#[derive(Debug, Clone)]
struct CachedSnapshot {
    version: u64,
    computed_at: Instant,
    snapshot: AnalyticsSnapshot,
}

impl CachedSnapshot {
    fn is_valid(&self, version: u64, now: Instant, ttl: Duration) -> bool {
        self.version == version && now.saturating_duration_since(self.computed_at) < ttl
    }
}

/// Snapshots keyed by canonical filter
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedSnapshot>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached snapshot for `key` if it is still valid
    pub fn get(&self, key: &str, version: u64, now: Instant) -> Option<AnalyticsSnapshot> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.is_valid(version, now, self.ttl))
            .map(|entry| entry.snapshot.clone())
    }

    /// Stores a snapshot, replacing any previous entry for `key`
    ///
    /// Entries that can no longer be served are evicted on the way.
    pub fn insert(&self, key: String, version: u64, now: Instant, snapshot: AnalyticsSnapshot) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.is_valid(version, now, ttl));
        entries.insert(
            key,
            CachedSnapshot {
                version,
                computed_at: now,
                snapshot,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
