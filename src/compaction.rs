//! Compaction scheduler (C7).
//!
//! Owns the HNSW index and the chunk/neuron KV trees, and funnels both
//! threshold-driven and periodic compaction requests into a single critical
//! section guarded by a `running` flag, mirroring the detached-timer shape
//! of the teacher's `github::background_sync` loop.

use crate::config::CompactionConfig;
use crate::index::HnswIndex;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Snapshot of the scheduler's counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompactionStats {
    pub running: bool,
    pub pending_tombstones: usize,
    pub total_compactions: u64,
    pub total_hnsw_removed: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// A KV store the scheduler should flush/compact each pass. Individual
/// failures are logged and do not abort the sweep.
pub trait Compactable: Send + Sync {
    fn compact(&self) -> crate::error::Result<()>;
}

pub struct CompactionScheduler {
    index: Arc<HnswIndex>,
    stores: Vec<Arc<dyn Compactable>>,
    config: CompactionConfig,
    running: AtomicBool,
    total_compactions: AtomicU64,
    total_hnsw_removed: AtomicU64,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
}

impl CompactionScheduler {
    pub fn new(index: Arc<HnswIndex>, stores: Vec<Arc<dyn Compactable>>, config: CompactionConfig) -> Arc<Self> {
        Arc::new(Self {
            index,
            stores,
            config,
            running: AtomicBool::new(false),
            total_compactions: AtomicU64::new(0),
            total_hnsw_removed: AtomicU64::new(0),
            last_run_at: Mutex::new(None),
        })
    }

    /// Spawn the detached interval timer. The returned handle is not
    /// required to keep the process alive (`spec.md` §5).
    pub fn spawn_timer(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        let interval_ms = self.config.interval_ms;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                scheduler.maybe_compact().await;
            }
        })
    }

    /// Fire-and-forget: compact if the tombstone threshold is exceeded.
    /// Safe to call after every delete.
    pub async fn maybe_compact(self: &Arc<Self>) {
        if self.index.tombstone_count().await >= self.config.tombstone_threshold {
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.force_compact().await;
            });
        }
    }

    /// Awaitable, idempotent compaction pass. Re-entry while a pass is
    /// already running is a no-op returning a zero result.
    pub async fn force_compact(&self) -> usize {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return 0;
        }

        let removed = self.index.compact().await;
        for store in &self.stores {
            if let Err(e) = store.compact() {
                warn!(error = %e, "compaction scheduler: store compact failed, continuing sweep");
            }
        }

        self.total_compactions.fetch_add(1, Ordering::SeqCst);
        self.total_hnsw_removed.fetch_add(removed as u64, Ordering::SeqCst);
        *self.last_run_at.lock().await = Some(Utc::now());

        self.running.store(false, Ordering::SeqCst);
        info!(removed, "compaction scheduler: pass complete");
        removed
    }

    pub async fn stats(&self) -> CompactionStats {
        CompactionStats {
            running: self.running.load(Ordering::SeqCst),
            pending_tombstones: self.index.tombstone_count().await,
            total_compactions: self.total_compactions.load(Ordering::SeqCst),
            total_hnsw_removed: self.total_hnsw_removed.load(Ordering::SeqCst),
            last_run_at: *self.last_run_at.lock().await,
        }
    }
}
