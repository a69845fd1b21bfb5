//! The business event transported end-to-end.

use chrono::{DateTime, Utc};

use super::id::{PortfolioId, TradeId};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse the wire representation (`"BUY"` / `"SELL"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }

    /// Wire representation of this side.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// A decoded trade event.
///
/// Constructed only by the classifier, which has already enforced the
/// field invariants (non-empty identifiers, known side, non-negative
/// quantity).
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub portfolio_id: PortfolioId,
    pub trade_id: TradeId,
    pub symbol: String,
    pub side: Side,
    pub price_per_stock: f64,
    pub quantity: i64,
    pub event_timestamp: DateTime<Utc>,
}
