//! Wire codec and message classification.
//!
//! The source stream and the downstream bus both carry the same protobuf
//! frame, defined here as a hand-written prost message. [`classify`] is the
//! pure decode-and-validate step: it either yields a [`TradeEvent`] or the
//! reason the bytes can never become one. No retries, no side effects.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use prost::Message;

use crate::domain::{PortfolioId, Side, TradeEvent, TradeId};

/// Protobuf frame for a trade event.
#[derive(Clone, PartialEq, Message)]
pub struct TradeEventWire {
    #[prost(string, tag = "1")]
    pub portfolio_id: String,
    #[prost(string, tag = "2")]
    pub trade_id: String,
    #[prost(string, tag = "3")]
    pub symbol: String,
    #[prost(string, tag = "4")]
    pub side: String,
    #[prost(double, tag = "5")]
    pub price_per_stock: f64,
    #[prost(int64, tag = "6")]
    pub quantity: i64,
    /// Milliseconds since the Unix epoch.
    #[prost(int64, tag = "7")]
    pub event_timestamp_ms: i64,
}

impl From<&TradeEvent> for TradeEventWire {
    fn from(trade: &TradeEvent) -> Self {
        Self {
            portfolio_id: trade.portfolio_id.as_str().to_string(),
            trade_id: trade.trade_id.as_str().to_string(),
            symbol: trade.symbol.clone(),
            side: trade.side.as_str().to_string(),
            price_per_stock: trade.price_per_stock,
            quantity: trade.quantity,
            event_timestamp_ms: trade.event_timestamp.timestamp_millis(),
        }
    }
}

/// Encode a trade event to its wire frame.
pub fn encode(trade: &TradeEvent) -> Bytes {
    let wire = TradeEventWire::from(trade);
    let mut buf = Vec::with_capacity(wire.encoded_len());
    wire.encode(&mut buf)
        .expect("Vec<u8> encoding is infallible");
    Bytes::from(buf)
}

/// Decode raw bytes into a validated [`TradeEvent`], or the reason the
/// payload is invalid.
///
/// Invalid when: the protobuf frame does not parse; `portfolio_id` or
/// `trade_id` is empty; the side is not `BUY`/`SELL`; the quantity is
/// negative; or the timestamp is out of range.
pub fn classify(raw: &[u8]) -> std::result::Result<TradeEvent, String> {
    let wire =
        TradeEventWire::decode(raw).map_err(|e| format!("Invalid protobuf payload: {e}"))?;

    if wire.portfolio_id.is_empty() || wire.trade_id.is_empty() {
        return Err("Missing required fields: portfolio_id or trade_id".to_string());
    }
    let side = Side::parse(&wire.side)
        .ok_or_else(|| format!("Unknown side '{}': expected BUY or SELL", wire.side))?;
    if wire.quantity < 0 {
        return Err(format!("Negative quantity {}", wire.quantity));
    }
    let event_timestamp = millis_to_datetime(wire.event_timestamp_ms)
        .ok_or_else(|| format!("Timestamp out of range: {}", wire.event_timestamp_ms))?;

    Ok(TradeEvent {
        portfolio_id: PortfolioId::new(wire.portfolio_id),
        trade_id: TradeId::new(wire.trade_id),
        symbol: wire.symbol,
        side,
        price_per_stock: wire.price_per_stock,
        quantity: wire.quantity,
        event_timestamp,
    })
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TradeEvent {
        TradeEvent {
            portfolio_id: PortfolioId::new("pf-7"),
            trade_id: TradeId::new("t-1001"),
            symbol: "ACME".into(),
            side: Side::Buy,
            price_per_stock: 42.5,
            quantity: 100,
            event_timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        }
    }

    #[test]
    fn encode_then_classify_roundtrips() {
        let trade = sample();
        let bytes = encode(&trade);
        let decoded = classify(&bytes).unwrap();
        assert_eq!(decoded, trade);
    }

    #[test]
    fn classify_then_encode_is_identity_on_canonical_bytes() {
        let bytes = encode(&sample());
        let decoded = classify(&bytes).unwrap();
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn garbage_bytes_are_invalid() {
        let reason = classify(&[0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(reason.contains("Invalid protobuf"), "got: {reason}");
    }

    #[test]
    fn empty_identifiers_are_invalid() {
        let mut wire = TradeEventWire::from(&sample());
        wire.portfolio_id.clear();
        let mut buf = Vec::new();
        wire.encode(&mut buf).unwrap();
        let reason = classify(&buf).unwrap_err();
        assert!(reason.contains("Missing required fields"));
    }

    #[test]
    fn unknown_side_is_invalid() {
        let mut wire = TradeEventWire::from(&sample());
        wire.side = "SHORT".into();
        let mut buf = Vec::new();
        wire.encode(&mut buf).unwrap();
        let reason = classify(&buf).unwrap_err();
        assert!(reason.contains("Unknown side"));
    }

    #[test]
    fn negative_quantity_is_invalid() {
        let mut wire = TradeEventWire::from(&sample());
        wire.quantity = -5;
        let mut buf = Vec::new();
        wire.encode(&mut buf).unwrap();
        let reason = classify(&buf).unwrap_err();
        assert!(reason.contains("Negative quantity"));
    }

    #[test]
    fn empty_payload_fails_required_field_validation() {
        // Zero bytes decode to a default (all-empty) frame.
        let reason = classify(&[]).unwrap_err();
        assert!(reason.contains("Missing required fields"));
    }
}
