//! Downstream event-bus port.

use std::fmt;

use async_trait::async_trait;

/// Root-caused publish failure, as reported by the bus adapter.
///
/// The adapter unwraps its client library's nested causes and reports the
/// innermost kind; the failure classifier maps these onto the poison-pill /
/// system-failure taxonomy without ever seeing a client type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Schema-aware serialization rejected the record.
    Serialization(String),
    /// The record exceeds the destination's size limits.
    PayloadTooLarge(String),
    /// Argument validation or null-invariant violation.
    InvalidRecord(String),
    /// The publish deadline elapsed.
    Timeout(String),
    /// The publishing task was cancelled mid-flight.
    Interrupted(String),
    /// Network-level connectivity failure.
    Transport(String),
    /// Broker unavailable or leader election in progress.
    BrokerUnavailable(String),
    /// Anything unrecognized.
    Other(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Serialization(m) => write!(f, "serialization failed: {m}"),
            PublishError::PayloadTooLarge(m) => write!(f, "payload too large: {m}"),
            PublishError::InvalidRecord(m) => write!(f, "invalid record: {m}"),
            PublishError::Timeout(m) => write!(f, "publish timeout: {m}"),
            PublishError::Interrupted(m) => write!(f, "publish interrupted: {m}"),
            PublishError::Transport(m) => write!(f, "transport error: {m}"),
            PublishError::BrokerUnavailable(m) => write!(f, "broker unavailable: {m}"),
            PublishError::Other(m) => write!(f, "publish failed: {m}"),
        }
    }
}

/// Partitioned, ordered publish seam.
///
/// Records with the same key land in the same partition and preserve their
/// send order; the dispatcher keys every record by portfolio id.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, key: &str, payload: &[u8]) -> std::result::Result<(), PublishError>;
}
