//! Mock collaborators for tests.
//!
//! Three families, mirroring the ports:
//!
//! - [`stream`] — scripted source streams and offset recorders.
//! - [`bus`] — a scripted downstream bus with programmable outcomes.
//! - [`store`] — an in-memory durable store implementing both store ports,
//!   including transaction-scoped portfolio locks, so dispatcher ordering
//!   properties are testable without a database.

pub mod bus;
pub mod store;
pub mod stream;

use bytes::Bytes;
use chrono::{TimeZone, Utc};

use crate::codec;
use crate::domain::{
    AckHandle, OutboxEntry, OutboxStatus, PendingMessage, PortfolioId, Side, TradeEvent, TradeId,
};

/// A deterministic trade for the given portfolio and trade ids.
pub fn sample_trade(portfolio: &str, trade: &str) -> TradeEvent {
    TradeEvent {
        portfolio_id: PortfolioId::new(portfolio),
        trade_id: TradeId::new(trade),
        symbol: "ACME".into(),
        side: Side::Buy,
        price_per_stock: 101.5,
        quantity: 10,
        event_timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
    }
}

/// A valid pending message at the given source offset.
pub fn valid_message(trade: &TradeEvent, offset: i64) -> PendingMessage {
    PendingMessage::valid(
        trade.clone(),
        codec::encode(trade),
        offset,
        Some(AckHandle {
            partition: 0,
            offset,
        }),
    )
}

/// An invalid pending message carrying raw junk.
pub fn invalid_message(raw: &'static [u8], offset: i64) -> PendingMessage {
    PendingMessage::invalid(
        "Invalid protobuf payload",
        Bytes::from_static(raw),
        offset,
        Some(AckHandle {
            partition: 0,
            offset,
        }),
    )
}

/// A PENDING outbox entry whose payload encodes the given trade.
pub fn outbox_entry(id: i64, trade: &TradeEvent) -> OutboxEntry {
    OutboxEntry {
        id,
        created_at: Utc.timestamp_millis_opt(1_700_000_000_000 + id).unwrap(),
        portfolio_id: trade.portfolio_id.clone(),
        trade_id: trade.trade_id.clone(),
        payload: codec::encode(trade),
        status: OutboxStatus::Pending,
        sent_at: None,
    }
}
