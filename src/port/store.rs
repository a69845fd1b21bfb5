//! Durable-store ports: ingress persistence and outbox dispatch.

use async_trait::async_trait;

use crate::domain::{OutboxEntry, PendingMessage, QuarantineEntry};
use crate::error::Result;

/// Write seam for the ingestion side.
///
/// The audit trail, the outbox and the quarantine live in the same
/// transactional store so one call commits them together.
#[async_trait]
pub trait IngressStore: Send + Sync {
    /// Persist a whole batch in one transaction: an audit row per message,
    /// an outbox row per valid message, a quarantine row per invalid one.
    /// Duplicate trade ids fail the transaction with an integrity error.
    async fn persist_batch(&self, batch: &[PendingMessage]) -> Result<()>;

    /// Persist one message in its own transaction. A duplicate trade id is
    /// absorbed as an idempotent replay: no error, no new outbox row.
    async fn persist_single(&self, msg: &PendingMessage) -> Result<()>;

    /// Insert a quarantine row in an isolated transaction that commits
    /// even when everything around it rolls back.
    async fn quarantine_isolated(&self, entry: QuarantineEntry) -> Result<()>;
}

/// Handle to the outbox side of the store.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Open a dispatch transaction. Portfolio advisory locks taken during
    /// [`OutboxTxn::fetch_pending`] are held until commit or rollback.
    async fn begin(&self) -> Result<Box<dyn OutboxTxn>>;
}

/// One open dispatch transaction.
///
/// Dropping the session without committing rolls it back, releasing every
/// advisory lock it holds.
#[async_trait]
pub trait OutboxTxn: Send {
    /// Up to `limit` PENDING entries in `(created_at, id)` order, filtered
    /// to portfolios whose advisory lock this transaction acquired. Rows
    /// belonging to portfolios locked elsewhere are invisible.
    async fn fetch_pending(&mut self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Bulk PENDING -> SENT transition with a server-side sent_at.
    async fn mark_sent(&mut self, ids: &[i64]) -> Result<usize>;

    /// Insert a quarantine row and delete the outbox entry, both within
    /// this transaction.
    async fn quarantine(&mut self, entry: &OutboxEntry, detail: &QuarantineEntry) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
