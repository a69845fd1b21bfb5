//! Lifecycle event emission port.
//!
//! Fire-and-forget progress notifications consumed by downstream tracing
//! systems. Emission never participates in persistence transactions and a
//! failed emit is logged and swallowed.

use async_trait::async_trait;

use crate::domain::TradeEvent;

/// Sink for ingestion lifecycle notifications.
#[async_trait]
pub trait LifecycleEmitter: Send + Sync {
    /// A trade was durably persisted (audit + outbox committed).
    async fn ingestion_succeeded(&self, trade: &TradeEvent);

    /// A message was quarantined at ingress.
    async fn ingestion_failed(&self, trade_id: &str, reason: &str);
}

/// Emitter that discards everything; used in tests and when no lifecycle
/// topic is configured.
pub struct NoopLifecycleEmitter;

#[async_trait]
impl LifecycleEmitter for NoopLifecycleEmitter {
    async fn ingestion_succeeded(&self, _trade: &TradeEvent) {}

    async fn ingestion_failed(&self, _trade_id: &str, _reason: &str) {}
}
