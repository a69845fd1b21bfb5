//! Source-stream port.
//!
//! The pipeline consumes an append-only log with offset semantics through
//! this seam. Delivery is pull-based: the ingest loop drains the adapter
//! one message at a time, and backpressure falls out naturally when the
//! loop stops pulling (the transport buffer fills and the source throttles).

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::AckHandle;
use crate::error::Result;

/// One framed message as delivered by the source stream.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub payload: Bytes,
    pub offset: i64,
    pub ack: AckHandle,
}

/// A subscribed source-stream consumer.
///
/// Implementations resume from the last stored offset on start and never
/// auto-commit: offset storage is always triggered explicitly through the
/// [`OffsetStore`] after downstream persistence succeeds.
#[async_trait]
pub trait TradeStream: Send {
    /// Receive the next message. `None` means the stream has closed.
    async fn next_message(&mut self) -> Result<Option<StreamMessage>>;

    /// Advisory pause hint, recorded for observability. Actual
    /// backpressure comes from not draining the transport.
    fn pause(&self);

    /// Advisory resume hint, the counterpart of [`pause`](Self::pause).
    fn resume(&self);
}

/// Durable "this offset is processed" tracking in the source stream.
///
/// Shared separately from [`TradeStream`] because the flusher stores
/// offsets while the ingest loop holds the consumer.
pub trait OffsetStore: Send + Sync {
    fn store_offset(&self, ack: &AckHandle) -> Result<()>;
}
