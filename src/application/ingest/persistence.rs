//! Atomic batch persistence with progressive degradation.
//!
//! Four levels, attempted in order:
//!
//! 1. whole batch in one transaction;
//! 2. per-item transactions when the batch fails on a data error;
//! 3. an isolated quarantine insert when an item itself is bad;
//! 4. the last-resort disk log when even the quarantine commit fails.
//!
//! System failures and an open circuit breaker abort the attempt and leave
//! the batch untouched; the flush loop sleeps and replays the same batch,
//! which pauses the stream by not draining it. The source offset is stored
//! only after the batch has fully landed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::domain::{MessageBody, PendingMessage, QuarantineEntry, INVALID_TRADE_ID};
use crate::error::{Error, Result};
use crate::infrastructure::metrics::PipelineMetrics;
use crate::port::lifecycle::LifecycleEmitter;
use crate::port::store::IngressStore;
use crate::port::stream::OffsetStore;

use super::breaker::CircuitBreaker;
use super::last_resort::LastResortLog;

/// The ingestion side's write path.
pub struct PersistenceCore {
    store: Arc<dyn IngressStore>,
    offsets: Arc<dyn OffsetStore>,
    breaker: Arc<CircuitBreaker>,
    lifecycle: Arc<dyn LifecycleEmitter>,
    metrics: Arc<PipelineMetrics>,
    last_resort: LastResortLog,
    retry_backoff: Duration,
}

impl PersistenceCore {
    pub fn new(
        store: Arc<dyn IngressStore>,
        offsets: Arc<dyn OffsetStore>,
        breaker: Arc<CircuitBreaker>,
        lifecycle: Arc<dyn LifecycleEmitter>,
        metrics: Arc<PipelineMetrics>,
        last_resort: LastResortLog,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            offsets,
            breaker,
            lifecycle,
            metrics,
            last_resort,
            retry_backoff,
        }
    }

    /// Persist a batch, retrying forever on system failures, then store the
    /// source offset of the last acknowledgeable message.
    ///
    /// An empty batch is a no-op and does not advance any offset.
    pub async fn flush(&self, batch: &[PendingMessage]) {
        if batch.is_empty() {
            return;
        }
        loop {
            match self.try_flush(batch).await {
                Ok(()) => {
                    self.ack_batch(batch);
                    return;
                }
                Err(Error::CircuitOpen) => {
                    warn!(
                        backoff_ms = self.retry_backoff.as_millis() as u64,
                        "Persistence circuit open; pausing stream and retrying batch"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Batch persistence failed; retrying");
                }
            }
            self.metrics.add_ingest_retry();
            tokio::time::sleep(self.retry_backoff).await;
        }
    }

    async fn try_flush(&self, batch: &[PendingMessage]) -> Result<()> {
        // Level 1: the whole batch in one transaction.
        let store = Arc::clone(&self.store);
        let attempt = self
            .breaker
            .execute(move || async move { store.persist_batch(batch).await })
            .await;
        match attempt {
            Ok(()) => {
                for msg in batch {
                    self.note_persisted(msg).await;
                }
                Ok(())
            }
            Err(e) if e.is_data_error() => {
                warn!(error = %e, "Batch transaction hit a data error; falling back to per-item persistence");
                self.flush_per_item(batch).await
            }
            Err(e) => Err(e),
        }
    }

    /// Level 2: one independent transaction per message.
    async fn flush_per_item(&self, batch: &[PendingMessage]) -> Result<()> {
        for msg in batch {
            self.persist_single_safely(msg).await?;
        }
        Ok(())
    }

    /// Persist one message in its own transaction.
    ///
    /// Returns `true` when the message landed in the store (including the
    /// idempotent-duplicate case), `false` when a data error routed it to
    /// quarantine or the disk log. System errors propagate so the caller
    /// retries the batch.
    pub async fn persist_single_safely(&self, msg: &PendingMessage) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let attempt = self
            .breaker
            .execute(move || async move { store.persist_single(msg).await })
            .await;
        match attempt {
            Ok(()) => {
                self.note_persisted(msg).await;
                Ok(true)
            }
            Err(e) if e.is_data_error() => {
                // Level 3: quarantine in an isolated transaction.
                let reason = format!("Data integrity failure: {e}");
                self.quarantine_or_disk(msg, &reason).await;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn quarantine_or_disk(&self, msg: &PendingMessage, reason: &str) {
        let entry = QuarantineEntry::new(msg.raw().clone(), reason);
        match self.store.quarantine_isolated(entry).await {
            Ok(()) => {
                self.metrics.add_ingest_quarantined(1);
                self.lifecycle
                    .ingestion_failed(INVALID_TRADE_ID, reason)
                    .await;
            }
            Err(e) => {
                // Level 4: the only place an error is swallowed.
                error!(error = %e, "Quarantine insert failed; writing last-resort record");
                self.last_resort.record(msg.raw(), reason);
                self.metrics.add_lost_to_disk();
            }
        }
    }

    async fn note_persisted(&self, msg: &PendingMessage) {
        match msg.body() {
            MessageBody::Valid(trade) => {
                self.metrics.add_ingested(1);
                self.lifecycle.ingestion_succeeded(trade).await;
            }
            MessageBody::Invalid { reason } => {
                self.metrics.add_ingest_quarantined(1);
                self.lifecycle
                    .ingestion_failed(INVALID_TRADE_ID, reason)
                    .await;
            }
        }
    }

    /// Store the offset of the last message in the batch that carries an
    /// ack handle. Replayed messages have none and are skipped, so a batch
    /// of only replays advances nothing.
    fn ack_batch(&self, batch: &[PendingMessage]) {
        let Some(ack) = batch.iter().rev().find_map(|m| m.ack()) else {
            return;
        };
        if let Err(e) = self.offsets.store_offset(&ack) {
            // The offset will be replayed after restart; at-least-once holds.
            warn!(error = %e, offset = ack.offset, "Failed to store source offset");
        }
    }
}
