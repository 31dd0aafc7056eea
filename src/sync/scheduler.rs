//! Scheduler owning the single in-flight sync run
//!
//! This module handles:
//! - Starting a run as a background task on the first trigger
//! - Attaching later triggers to the same run instead of starting another
//! - The optional auto-refresh loop
//! - Shutdown of the refresh loop and any in-flight run

use crate::sync::{SyncEngine, SyncError, SyncOptions, SyncReport};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

type RunFuture = Shared<BoxFuture<'static, Result<SyncReport, SyncError>>>;

/// Handle to a running (or finished) sync run
///
/// Cloning is cheap; every clone resolves to the same outcome.
#[derive(Clone)]
pub struct SyncHandle {
    id: u64,
    run: RunFuture,
}

impl SyncHandle {
    /// Identifier of the run this handle is attached to
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the run to finish
    pub async fn wait(self) -> Result<SyncReport, SyncError> {
        self.run.await
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle").field("id", &self.id).finish()
    }
}

type Slot = Arc<Mutex<Option<SyncHandle>>>;

/// Clears the in-flight slot when the run task ends, however it ends
struct ClearSlot {
    slot: Slot,
    id: u64,
}

impl Drop for ClearSlot {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map(SyncHandle::id) == Some(self.id) {
            *slot = None;
        }
    }
}

/// Process-wide owner of the sync run
///
/// Constructed once at startup; clones share the same slot.
#[derive(Clone)]
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    in_flight: Slot,
    next_id: Arc<AtomicU64>,
    refresh: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncScheduler {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            in_flight: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(0)),
            refresh: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts a run, or attaches to the one already in flight
    ///
    /// The run proceeds in the background whether or not the handle is
    /// awaited. Options of an attaching trigger are ignored.
    pub fn trigger(&self, options: SyncOptions) -> SyncHandle {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = slot.as_ref() {
            tracing::debug!("Sync run {} already in flight, attaching", active.id);
            return active.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let engine = Arc::clone(&self.engine);
        let guard = ClearSlot {
            slot: Arc::clone(&self.in_flight),
            id,
        };

        let task = tokio::spawn(async move {
            let _guard = guard;
            engine.run(options).await
        });

        let run = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(SyncError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        tracing::debug!("Started sync run {}", id);
        let handle = SyncHandle { id, run };
        *slot = Some(handle.clone());
        handle
    }

    /// Returns true while a run is in flight
    pub fn is_syncing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs `f` only while no run is in flight
    ///
    /// The in-flight slot stays locked until `f` returns, so triggers issued
    /// meanwhile wait and start afterwards. Returns `None` without calling
    /// `f` when a run is in flight.
    pub fn while_idle<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return None;
        }
        Some(f())
    }

    /// Handle to the in-flight run, if any
    pub fn current(&self) -> Option<SyncHandle> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Triggers a non-forced run every `every`, starting immediately
    ///
    /// Failures are logged and never propagated. Replaces any previous loop.
    pub fn spawn_auto_refresh(&self, every: Duration) {
        let scheduler = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match scheduler.trigger(SyncOptions::default()).wait().await {
                    Ok(report) => tracing::debug!("Auto refresh: {}", report.outcome),
                    Err(e) => tracing::warn!("Auto refresh failed: {}", e),
                }
            }
        });

        let previous = self
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::info!("Auto refresh every {:?}", every);
    }

    /// Stops the refresh loop and waits for any in-flight run
    pub async fn shutdown(&self) {
        let refresh = self
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(refresh) = refresh {
            refresh.abort();
        }

        if let Some(handle) = self.current() {
            tracing::info!("Waiting for sync run {} to finish", handle.id());
            if let Err(e) = handle.wait().await {
                tracing::warn!("Sync run ended with error during shutdown: {}", e);
            }
        }
    }
}
