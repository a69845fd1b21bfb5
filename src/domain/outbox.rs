//! Durable records: audit trail, transactional outbox, quarantine.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::id::{PortfolioId, TradeId};
use super::trade::TradeEvent;

/// Sentinel trade identity recorded for messages that failed classification.
/// The audit uniqueness constraint only covers valid rows, so the sentinel
/// never collides.
pub const INVALID_TRADE_ID: &str = "INVALID";

/// Quarantine detail column width; longer reasons are truncated by writers.
pub const MAX_ERROR_DETAIL: usize = 4096;

/// One row of the append-only audit trail.
///
/// Every message delivered by the stream adapter produces exactly one of
/// these before its offset is acknowledged, valid or not.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub portfolio_id: String,
    pub trade_id: String,
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub price_per_stock: Option<f64>,
    pub quantity: Option<i64>,
    pub event_timestamp: Option<DateTime<Utc>>,
    pub raw_payload: Bytes,
    pub valid: bool,
}

impl AuditRecord {
    /// Audit row for a decoded trade.
    pub fn from_trade(trade: &TradeEvent, raw: Bytes) -> Self {
        Self {
            portfolio_id: trade.portfolio_id.as_str().to_string(),
            trade_id: trade.trade_id.as_str().to_string(),
            symbol: Some(trade.symbol.clone()),
            side: Some(trade.side.as_str().to_string()),
            price_per_stock: Some(trade.price_per_stock),
            quantity: Some(trade.quantity),
            event_timestamp: Some(trade.event_timestamp),
            raw_payload: raw,
            valid: true,
        }
    }

    /// Audit row for a message that failed classification. Uses the
    /// sentinel identity; business fields stay empty.
    pub fn invalid(raw: Bytes) -> Self {
        Self {
            portfolio_id: INVALID_TRADE_ID.to_string(),
            trade_id: INVALID_TRADE_ID.to_string(),
            symbol: None,
            side: None,
            price_per_stock: None,
            quantity: None,
            event_timestamp: None,
            raw_payload: raw,
            valid: false,
        }
    }
}

/// Outbox row lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Sent,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OutboxStatus::Pending),
            "SENT" => Some(OutboxStatus::Sent),
            _ => None,
        }
    }
}

/// A row of the transactional outbox, created atomically with the audit
/// record for the same trade. Transitions PENDING -> SENT exactly once.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub portfolio_id: PortfolioId,
    pub trade_id: TradeId,
    pub payload: Bytes,
    pub status: OutboxStatus,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Terminal holding area for messages that can never be published.
/// Append-only; rows are never updated.
#[derive(Debug, Clone)]
pub struct QuarantineEntry {
    pub raw_message: Bytes,
    pub error_detail: String,
}

impl QuarantineEntry {
    /// Build an entry, truncating the detail to the column width.
    pub fn new(raw_message: Bytes, error_detail: impl Into<String>) -> Self {
        let mut detail: String = error_detail.into();
        if detail.len() > MAX_ERROR_DETAIL {
            detail.truncate(MAX_ERROR_DETAIL);
        }
        Self {
            raw_message,
            error_detail: detail,
        }
    }
}
