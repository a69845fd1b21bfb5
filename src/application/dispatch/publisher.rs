//! Ordered, prefix-safe publication of one portfolio's batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error};

use crate::codec;
use crate::domain::{BatchOutcome, Classification, OutboxEntry, PoisonPill};
use crate::port::bus::{EventBus, PublishError};

use super::classify::classify_publish_error;

/// Publishes a portfolio's entries to the downstream bus in order.
///
/// The walk stops at the first failure: a poison pill is reported for
/// quarantine and later entries stay PENDING for the next iteration; a
/// system failure halts the whole batch so ordering is preserved. The
/// returned `sent` list is always a contiguous prefix of the input.
pub struct PublicationEngine {
    bus: Arc<dyn EventBus>,
    publish_timeout: Duration,
}

impl PublicationEngine {
    pub fn new(bus: Arc<dyn EventBus>, publish_timeout: Duration) -> Self {
        Self {
            bus,
            publish_timeout,
        }
    }

    /// Process one per-portfolio batch, already in `(created_at, id)` order.
    pub async fn process_batch(&self, entries: &[OutboxEntry]) -> BatchOutcome {
        let mut sent = Vec::with_capacity(entries.len());

        for entry in entries {
            // A stored payload that no longer decodes can never publish.
            if let Err(reason) = codec::classify(entry.payload.as_ref()) {
                error!(entry_id = entry.id, %reason, "Poison pill: stored payload failed decode");
                return BatchOutcome::PoisonPill {
                    sent,
                    pill: PoisonPill {
                        entry_id: entry.id,
                        reason: format!("decode failure: {reason}"),
                    },
                };
            }

            match self.publish_with_deadline(entry).await {
                Ok(()) => {
                    debug!(entry_id = entry.id, portfolio = %entry.portfolio_id, "Published");
                    sent.push(entry.id);
                }
                Err(err) => {
                    let (class, reason) = classify_publish_error(&err);
                    return match class {
                        Classification::PoisonPill => {
                            error!(entry_id = entry.id, %reason, "Poison pill at publish");
                            BatchOutcome::PoisonPill {
                                sent,
                                pill: PoisonPill {
                                    entry_id: entry.id,
                                    reason,
                                },
                            }
                        }
                        Classification::SystemFailure => {
                            error!(
                                entry_id = entry.id,
                                %reason,
                                "System failure; stopping batch to preserve ordering"
                            );
                            BatchOutcome::SystemFailure { sent, reason }
                        }
                    };
                }
            }
        }

        BatchOutcome::Success { sent }
    }

    /// Blocking publish keyed by portfolio, bounded by the hard deadline.
    async fn publish_with_deadline(
        &self,
        entry: &OutboxEntry,
    ) -> std::result::Result<(), PublishError> {
        let publish = self
            .bus
            .publish(entry.portfolio_id.as_str(), entry.payload.as_ref());
        match timeout(self.publish_timeout, publish).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(format!(
                "no broker ack after {}ms",
                self.publish_timeout.as_millis()
            ))),
        }
    }
}
