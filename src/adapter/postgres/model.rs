//! Database row types for Diesel.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{audit_trade, outbox_entry, quarantine_entry};
use crate::domain::{AuditRecord, QuarantineEntry};

/// Insertable audit row. `received_at` uses the server-side default.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = audit_trade)]
pub struct NewAuditRow {
    pub portfolio_id: String,
    pub trade_id: String,
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub price_per_stock: Option<f64>,
    pub quantity: Option<i64>,
    pub event_timestamp: Option<DateTime<Utc>>,
    pub raw_payload: Vec<u8>,
    pub valid: bool,
}

impl From<&AuditRecord> for NewAuditRow {
    fn from(record: &AuditRecord) -> Self {
        Self {
            portfolio_id: record.portfolio_id.clone(),
            trade_id: record.trade_id.clone(),
            symbol: record.symbol.clone(),
            side: record.side.clone(),
            price_per_stock: record.price_per_stock,
            quantity: record.quantity,
            event_timestamp: record.event_timestamp,
            raw_payload: record.raw_payload.to_vec(),
            valid: record.valid,
        }
    }
}

/// Insertable outbox row. `created_at` uses the server-side default so
/// flush order assigns the authoritative per-portfolio order.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = outbox_entry)]
pub struct NewOutboxRow {
    pub portfolio_id: String,
    pub trade_id: String,
    pub payload: Vec<u8>,
    pub status: String,
}

/// Insertable quarantine row.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = quarantine_entry)]
pub struct NewQuarantineRow {
    pub raw_message: Vec<u8>,
    pub error_detail: String,
}

impl From<&QuarantineEntry> for NewQuarantineRow {
    fn from(entry: &QuarantineEntry) -> Self {
        Self {
            raw_message: entry.raw_message.to_vec(),
            error_detail: entry.error_detail.clone(),
        }
    }
}

/// Outbox row as returned by the advisory-lock fetch.
#[derive(QueryableByName, Queryable, Debug, Clone)]
#[diesel(table_name = outbox_entry)]
pub struct OutboxRowDb {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub portfolio_id: String,
    pub trade_id: String,
    pub payload: Vec<u8>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
}
