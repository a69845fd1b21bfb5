//! In-flight message state between stream receive and batch flush.

use bytes::Bytes;

use super::trade::TradeEvent;

/// Opaque acknowledgement handle for a source-stream position.
///
/// Carried from receive to flush so the offset is stored only after the
/// batch containing the message has committed. Replayed messages have no
/// handle and are skipped at ack time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHandle {
    pub partition: i32,
    pub offset: i64,
}

/// Sentinel offset for messages injected via admin replay.
pub const REPLAY_OFFSET: i64 = -1;

/// Classification result carried by a pending message.
#[derive(Debug, Clone)]
pub enum MessageBody {
    Valid(TradeEvent),
    Invalid { reason: String },
}

/// A message received from the source stream but not yet persisted or
/// offset-acknowledged.
///
/// Immutable after construction. Pairs the classification outcome with the
/// raw bytes (preserved for the audit trail and quarantine) and the stream
/// position. Dropped once the batch containing it has been flushed and its
/// offset stored.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    body: MessageBody,
    raw: Bytes,
    offset: i64,
    ack: Option<AckHandle>,
}

impl PendingMessage {
    /// A successfully decoded and validated message.
    pub fn valid(trade: TradeEvent, raw: Bytes, offset: i64, ack: Option<AckHandle>) -> Self {
        Self {
            body: MessageBody::Valid(trade),
            raw,
            offset,
            ack,
        }
    }

    /// A message that failed decoding or validation.
    pub fn invalid(
        reason: impl Into<String>,
        raw: Bytes,
        offset: i64,
        ack: Option<AckHandle>,
    ) -> Self {
        Self {
            body: MessageBody::Invalid {
                reason: reason.into(),
            },
            raw,
            offset,
            ack,
        }
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// The decoded trade, when the message classified as valid.
    pub fn trade(&self) -> Option<&TradeEvent> {
        match &self.body {
            MessageBody::Valid(trade) => Some(trade),
            MessageBody::Invalid { .. } => None,
        }
    }

    pub fn invalid_reason(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Valid(_) => None,
            MessageBody::Invalid { reason } => Some(reason),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.body, MessageBody::Valid(_))
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn ack(&self) -> Option<AckHandle> {
        self.ack
    }

    /// True for messages injected through the admin replay endpoint.
    pub fn is_replay(&self) -> bool {
        self.ack.is_none() && self.offset == REPLAY_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::{PortfolioId, TradeId};
    use crate::domain::trade::Side;
    use chrono::Utc;

    fn trade() -> TradeEvent {
        TradeEvent {
            portfolio_id: PortfolioId::new("pf-1"),
            trade_id: TradeId::new("t-1"),
            symbol: "ACME".into(),
            side: Side::Buy,
            price_per_stock: 10.5,
            quantity: 3,
            event_timestamp: Utc::now(),
        }
    }

    #[test]
    fn valid_message_exposes_trade() {
        let msg = PendingMessage::valid(
            trade(),
            Bytes::from_static(b"raw"),
            7,
            Some(AckHandle {
                partition: 0,
                offset: 7,
            }),
        );
        assert!(msg.is_valid());
        assert_eq!(msg.trade().unwrap().trade_id.as_str(), "t-1");
        assert!(msg.invalid_reason().is_none());
        assert!(!msg.is_replay());
    }

    #[test]
    fn invalid_message_carries_reason_and_raw() {
        let msg = PendingMessage::invalid("bad protobuf", Bytes::from_static(b"junk"), 9, None);
        assert!(!msg.is_valid());
        assert_eq!(msg.invalid_reason(), Some("bad protobuf"));
        assert_eq!(msg.raw().as_ref(), b"junk");
    }

    #[test]
    fn replay_message_is_detected() {
        let msg = PendingMessage::valid(trade(), Bytes::new(), REPLAY_OFFSET, None);
        assert!(msg.is_replay());
    }
}
