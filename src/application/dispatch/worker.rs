//! The outbox dispatch loop.
//!
//! One long-running loop per process; any number of processes may run it
//! concurrently. Correctness across processes comes from the store's
//! portfolio advisory locks, not from thread coordination: a fetch only
//! returns rows of portfolios this transaction locked, so no other
//! dispatcher can see (let alone publish) those portfolios until commit.
//!
//! Each iteration is one transaction covering fetch, publication handling,
//! mark-sent and quarantine, so the locks are held for the whole cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::domain::{BatchOutcome, OutboxEntry, PortfolioId, QuarantineEntry};
use crate::error::Result;
use crate::infrastructure::metrics::PipelineMetrics;
use crate::port::store::{OutboxStore, OutboxTxn};

use super::publisher::PublicationEngine;
use crate::application::ingest::sizer::AdaptiveBatchSizer;

/// Dispatcher timing knobs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// First backoff after a system failure (B0).
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Sleep between iterations when the outbox is empty.
    pub idle_interval: Duration,
}

/// Stop handle for a running dispatcher.
#[derive(Clone)]
pub struct WorkerHandle {
    running: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Request a stop; the loop exits at the next iteration boundary,
    /// always after committing any in-progress transaction.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

enum Iteration {
    Idle,
    Processed { fetched: usize },
    SystemFailure,
}

/// The dispatch worker. Run it as a single task per process.
pub struct DispatchWorker {
    outbox: Arc<dyn OutboxStore>,
    engine: PublicationEngine,
    sizer: AdaptiveBatchSizer,
    config: DispatchConfig,
    metrics: Arc<PipelineMetrics>,
    running: Arc<AtomicBool>,
}

impl DispatchWorker {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        engine: PublicationEngine,
        sizer: AdaptiveBatchSizer,
        config: DispatchConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            outbox,
            engine,
            sizer,
            config,
            metrics,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub async fn run(mut self) {
        info!("Outbox dispatcher started");
        let mut backoff = Duration::ZERO;

        while self.running.load(Ordering::SeqCst) {
            if backoff > Duration::ZERO {
                warn!(backoff_ms = backoff.as_millis() as u64, "System failure backoff active");
                sleep(backoff).await;
            }

            let started = Instant::now();
            match self.run_iteration().await {
                Ok(Iteration::Idle) => {
                    self.sizer.reset();
                    backoff = Duration::ZERO;
                    sleep(self.config.idle_interval).await;
                }
                Ok(Iteration::Processed { fetched }) => {
                    backoff = Duration::ZERO;
                    self.sizer.adjust(started.elapsed(), fetched);
                }
                Ok(Iteration::SystemFailure) => {
                    backoff = self.next_backoff(backoff);
                }
                Err(e) => {
                    // Transaction-level failure: the session rolled back,
                    // rows stay PENDING, locks are released.
                    error!(error = %e, "Dispatch iteration failed");
                    backoff = self.next_backoff(backoff);
                }
            }
        }
        info!("Outbox dispatcher stopped");
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2)
            .max(self.config.initial_backoff)
            .min(self.config.max_backoff)
    }

    async fn run_iteration(&self) -> Result<Iteration> {
        let mut txn = self.outbox.begin().await?;

        let batch = txn.fetch_pending(self.sizer.current_size()).await?;
        if batch.is_empty() {
            // Nothing pending, or every portfolio is locked elsewhere.
            txn.commit().await?;
            return Ok(Iteration::Idle);
        }
        let fetched = batch.len();

        let mut system_failure = false;
        for (portfolio, entries) in group_by_portfolio(batch) {
            let outcome = self.engine.process_batch(&entries).await;

            let sent = outcome.sent();
            if !sent.is_empty() {
                txn.mark_sent(sent).await?;
                self.metrics.add_dispatched(sent.len() as u64);
                info!(portfolio = %portfolio, count = sent.len(), "Marked entries as SENT");
            }

            match outcome {
                BatchOutcome::Success { .. } => {}
                BatchOutcome::PoisonPill { pill, .. } => {
                    let Some(entry) = entries.iter().find(|e| e.id == pill.entry_id) else {
                        error!(entry_id = pill.entry_id, "Poison pill id not found in batch");
                        continue;
                    };
                    let detail = QuarantineEntry::new(
                        entry.payload.clone(),
                        format!("Poison Pill: {}", pill.reason),
                    );
                    txn.quarantine(entry, &detail).await?;
                    self.metrics.add_poison_pill();
                    warn!(portfolio = %portfolio, entry_id = pill.entry_id, "Routed poison pill to quarantine");
                }
                BatchOutcome::SystemFailure { .. } => {
                    // Stop processing other portfolios; the successful
                    // prefix still commits below.
                    system_failure = true;
                    break;
                }
            }
        }

        txn.commit().await?;
        Ok(if system_failure {
            Iteration::SystemFailure
        } else {
            Iteration::Processed { fetched }
        })
    }
}

/// Group entries by portfolio, preserving first-seen group order and the
/// `(created_at, id)` order within each group.
fn group_by_portfolio(batch: Vec<OutboxEntry>) -> Vec<(PortfolioId, Vec<OutboxEntry>)> {
    let mut groups: Vec<(PortfolioId, Vec<OutboxEntry>)> = Vec::new();
    for entry in batch {
        match groups.iter_mut().find(|(p, _)| *p == entry.portfolio_id) {
            Some((_, entries)) => entries.push(entry),
            None => groups.push((entry.portfolio_id.clone(), vec![entry])),
        }
    }
    groups
}
