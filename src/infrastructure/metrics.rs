//! Pipeline counters.
//!
//! Plain atomics shared across the ingest and dispatch loops; snapshots
//! are cheap enough to read from tests and periodic log lines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters covering both ends of the pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    ingested: AtomicU64,
    ingest_quarantined: AtomicU64,
    ingest_retries: AtomicU64,
    lost_to_disk: AtomicU64,
    dispatched: AtomicU64,
    poison_pills: AtomicU64,
}

/// Point-in-time view of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ingested: u64,
    pub ingest_quarantined: u64,
    pub ingest_retries: u64,
    pub lost_to_disk: u64,
    pub dispatched: u64,
    pub poison_pills: u64,
}

impl PipelineMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Trades durably persisted to audit + outbox.
    pub fn add_ingested(&self, count: u64) {
        self.ingested.fetch_add(count, Ordering::Relaxed);
    }

    /// Messages quarantined at ingress (invalid or integrity-failed).
    pub fn add_ingest_quarantined(&self, count: u64) {
        self.ingest_quarantined.fetch_add(count, Ordering::Relaxed);
    }

    /// Whole-batch retries caused by system failures or an open breaker.
    pub fn add_ingest_retry(&self) {
        self.ingest_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages recorded only in the last-resort disk log.
    pub fn add_lost_to_disk(&self) {
        self.lost_to_disk.fetch_add(1, Ordering::Relaxed);
    }

    /// Outbox entries published and marked SENT.
    pub fn add_dispatched(&self, count: u64) {
        self.dispatched.fetch_add(count, Ordering::Relaxed);
    }

    /// Outbox entries routed to quarantine at publish time.
    pub fn add_poison_pill(&self) {
        self.poison_pills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            ingest_quarantined: self.ingest_quarantined.load(Ordering::Relaxed),
            ingest_retries: self.ingest_retries.load(Ordering::Relaxed),
            lost_to_disk: self.lost_to_disk.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            poison_pills: self.poison_pills.load(Ordering::Relaxed),
        }
    }
}
