//! Postgres-backed capture store.
//!
//! Implements both store ports over one diesel pool. The dispatch side
//! manages its transaction explicitly so the portfolio advisory locks taken
//! during the fetch stay held across publishing until commit.

use async_trait::async_trait;
use bytes::Bytes;
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::BigInt;
use diesel::upsert::*;
use tracing::warn;

use crate::domain::{
    AuditRecord, MessageBody, OutboxEntry, OutboxStatus, PendingMessage, PortfolioId,
    QuarantineEntry, TradeId,
};
use crate::error::{Error, Result};
use crate::port::store::{IngressStore, OutboxStore, OutboxTxn};

use super::connection::{DbConn, DbPool};
use super::model::{NewAuditRow, NewOutboxRow, NewQuarantineRow, OutboxRowDb};
use super::schema::{audit_trade, outbox_entry, quarantine_entry};

/// Advisory-lock fetch. The lock is transaction-scoped and evaluated per
/// row: portfolios already owned by another transaction are filtered out,
/// which is what makes leapfrogging impossible across dispatchers.
const FETCH_PENDING_SQL: &str = "\
    SELECT id, created_at, portfolio_id, trade_id, payload, status, sent_at \
    FROM outbox_entry \
    WHERE status = 'PENDING' \
      AND pg_try_advisory_xact_lock(hashtext(portfolio_id)) \
    ORDER BY created_at ASC, id ASC \
    LIMIT $1";

fn map_diesel(e: DieselError) -> Error {
    match e {
        DieselError::DatabaseError(kind, info) => match kind {
            DatabaseErrorKind::UniqueViolation
            | DatabaseErrorKind::ForeignKeyViolation
            | DatabaseErrorKind::CheckViolation
            | DatabaseErrorKind::NotNullViolation => Error::Integrity(info.message().to_string()),
            DatabaseErrorKind::ClosedConnection => Error::Connection(info.message().to_string()),
            _ => Error::Database(info.message().to_string()),
        },
        other => Error::Database(other.to_string()),
    }
}

/// Postgres store handle.
pub struct PgCaptureStore {
    pool: DbPool,
}

impl PgCaptureStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }

    fn audit_row(msg: &PendingMessage) -> NewAuditRow {
        let record = match msg.body() {
            MessageBody::Valid(trade) => AuditRecord::from_trade(trade, msg.raw().clone()),
            MessageBody::Invalid { .. } => AuditRecord::invalid(msg.raw().clone()),
        };
        NewAuditRow::from(&record)
    }
}

#[async_trait]
impl IngressStore for PgCaptureStore {
    async fn persist_batch(&self, batch: &[PendingMessage]) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, DieselError, _>(|conn| {
            for msg in batch {
                diesel::insert_into(audit_trade::table)
                    .values(Self::audit_row(msg))
                    .execute(conn)?;
                match msg.body() {
                    MessageBody::Valid(trade) => {
                        diesel::insert_into(outbox_entry::table)
                            .values(NewOutboxRow {
                                portfolio_id: trade.portfolio_id.as_str().to_string(),
                                trade_id: trade.trade_id.as_str().to_string(),
                                payload: msg.raw().to_vec(),
                                status: OutboxStatus::Pending.as_str().to_string(),
                            })
                            .execute(conn)?;
                    }
                    MessageBody::Invalid { reason } => {
                        let entry = QuarantineEntry::new(msg.raw().clone(), reason.clone());
                        diesel::insert_into(quarantine_entry::table)
                            .values(NewQuarantineRow::from(&entry))
                            .execute(conn)?;
                    }
                }
            }
            Ok(())
        })
        .map_err(map_diesel)
    }

    async fn persist_single(&self, msg: &PendingMessage) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, DieselError, _>(|conn| {
            match msg.body() {
                MessageBody::Valid(trade) => {
                    // The partial unique index only covers valid rows, so a
                    // replayed trade id is absorbed without error here.
                    let inserted = diesel::insert_into(audit_trade::table)
                        .values(Self::audit_row(msg))
                        .on_conflict(audit_trade::trade_id)
                        .filter_target(audit_trade::valid)
                        .do_nothing()
                        .execute(conn)?;
                    if inserted > 0 {
                        diesel::insert_into(outbox_entry::table)
                            .values(NewOutboxRow {
                                portfolio_id: trade.portfolio_id.as_str().to_string(),
                                trade_id: trade.trade_id.as_str().to_string(),
                                payload: msg.raw().to_vec(),
                                status: OutboxStatus::Pending.as_str().to_string(),
                            })
                            .execute(conn)?;
                    }
                }
                MessageBody::Invalid { reason } => {
                    diesel::insert_into(audit_trade::table)
                        .values(Self::audit_row(msg))
                        .execute(conn)?;
                    let entry = QuarantineEntry::new(msg.raw().clone(), reason.clone());
                    diesel::insert_into(quarantine_entry::table)
                        .values(NewQuarantineRow::from(&entry))
                        .execute(conn)?;
                }
            }
            Ok(())
        })
        .map_err(map_diesel)
    }

    async fn quarantine_isolated(&self, entry: QuarantineEntry) -> Result<()> {
        // Own connection, own transaction: commits even when the batch
        // around it rolled back.
        let mut conn = self.conn()?;
        diesel::insert_into(quarantine_entry::table)
            .values(NewQuarantineRow::from(&entry))
            .execute(&mut conn)
            .map_err(map_diesel)?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PgCaptureStore {
    async fn begin(&self) -> Result<Box<dyn OutboxTxn>> {
        let mut conn = self.conn()?;
        AnsiTransactionManager::begin_transaction(&mut *conn).map_err(map_diesel)?;
        Ok(Box::new(PgOutboxTxn { conn, open: true }))
    }
}

/// One open dispatch transaction on a dedicated pooled connection.
pub struct PgOutboxTxn {
    conn: DbConn,
    open: bool,
}

#[async_trait]
impl OutboxTxn for PgOutboxTxn {
    async fn fetch_pending(&mut self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows: Vec<OutboxRowDb> = diesel::sql_query(FETCH_PENDING_SQL)
            .bind::<BigInt, _>(limit as i64)
            .load(&mut *self.conn)
            .map_err(map_diesel)?;

        rows.into_iter()
            .map(|row| {
                let status = OutboxStatus::parse(&row.status)
                    .ok_or_else(|| Error::Database(format!("unknown outbox status {}", row.status)))?;
                Ok(OutboxEntry {
                    id: row.id,
                    created_at: row.created_at,
                    portfolio_id: PortfolioId::new(row.portfolio_id),
                    trade_id: TradeId::new(row.trade_id),
                    payload: Bytes::from(row.payload),
                    status,
                    sent_at: row.sent_at,
                })
            })
            .collect()
    }

    async fn mark_sent(&mut self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        diesel::update(outbox_entry::table.filter(outbox_entry::id.eq_any(ids)))
            .set((
                outbox_entry::status.eq(OutboxStatus::Sent.as_str()),
                outbox_entry::sent_at.eq(diesel::dsl::now),
            ))
            .execute(&mut *self.conn)
            .map_err(map_diesel)
    }

    async fn quarantine(&mut self, entry: &OutboxEntry, detail: &QuarantineEntry) -> Result<()> {
        diesel::insert_into(quarantine_entry::table)
            .values(NewQuarantineRow::from(detail))
            .execute(&mut *self.conn)
            .map_err(map_diesel)?;
        diesel::delete(outbox_entry::table.filter(outbox_entry::id.eq(entry.id)))
            .execute(&mut *self.conn)
            .map_err(map_diesel)?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        AnsiTransactionManager::commit_transaction(&mut *self.conn).map_err(map_diesel)?;
        self.open = false;
        Ok(())
    }
}

impl Drop for PgOutboxTxn {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = AnsiTransactionManager::rollback_transaction(&mut *self.conn) {
                warn!(error = %e, "Failed to roll back dispatch transaction");
            }
        }
    }
}
