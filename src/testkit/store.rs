//! In-memory durable store implementing both store ports.
//!
//! Faithful enough for pipeline tests: batch persistence is transactional
//! (a data error applies nothing), the single path absorbs duplicate trade
//! ids, and dispatch transactions take hash-keyed portfolio locks that are
//! held until commit or rollback — the same collision-tolerant semantics
//! the production store gets from `pg_try_advisory_xact_lock(hashtext(..))`.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;

use crate::domain::{
    MessageBody, OutboxEntry, OutboxStatus, PendingMessage, PortfolioId, QuarantineEntry, TradeId,
    INVALID_TRADE_ID,
};
use crate::error::{Error, Result};
use crate::port::store::{IngressStore, OutboxStore, OutboxTxn};

/// Audit row as stored.
#[derive(Debug, Clone)]
pub struct AuditRow {
    pub id: i64,
    pub received_at: DateTime<Utc>,
    pub portfolio_id: String,
    pub trade_id: String,
    pub raw: Bytes,
    pub valid: bool,
}

/// Outbox row as stored.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub portfolio_id: String,
    pub trade_id: String,
    pub payload: Bytes,
    pub status: OutboxStatus,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Quarantine row as stored.
#[derive(Debug, Clone)]
pub struct QuarantineRow {
    pub id: i64,
    pub raw: Bytes,
    pub error_detail: String,
}

#[derive(Default)]
struct State {
    next_audit_id: i64,
    next_outbox_id: i64,
    next_quarantine_id: i64,
    seq: i64,
    audit: Vec<AuditRow>,
    outbox: Vec<OutboxRow>,
    quarantine: Vec<QuarantineRow>,
}

impl State {
    fn next_created_at(&mut self) -> DateTime<Utc> {
        self.seq += 1;
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + ChronoDuration::milliseconds(self.seq)
    }

    fn has_valid_trade(&self, trade_id: &str) -> bool {
        self.audit.iter().any(|r| r.valid && r.trade_id == trade_id)
    }

    fn insert_audit(&mut self, msg: &PendingMessage) {
        let row = match msg.body() {
            MessageBody::Valid(trade) => AuditRow {
                id: 0,
                received_at: Utc::now(),
                portfolio_id: trade.portfolio_id.as_str().to_string(),
                trade_id: trade.trade_id.as_str().to_string(),
                raw: msg.raw().clone(),
                valid: true,
            },
            MessageBody::Invalid { .. } => AuditRow {
                id: 0,
                received_at: Utc::now(),
                portfolio_id: INVALID_TRADE_ID.to_string(),
                trade_id: INVALID_TRADE_ID.to_string(),
                raw: msg.raw().clone(),
                valid: false,
            },
        };
        self.next_audit_id += 1;
        self.audit.push(AuditRow {
            id: self.next_audit_id,
            ..row
        });
    }

    fn insert_outbox(&mut self, portfolio_id: &str, trade_id: &str, payload: Bytes) -> i64 {
        self.next_outbox_id += 1;
        let id = self.next_outbox_id;
        let created_at = self.next_created_at();
        self.outbox.push(OutboxRow {
            id,
            created_at,
            portfolio_id: portfolio_id.to_string(),
            trade_id: trade_id.to_string(),
            payload,
            status: OutboxStatus::Pending,
            sent_at: None,
        });
        id
    }

    fn insert_quarantine(&mut self, raw: Bytes, detail: String) {
        self.next_quarantine_id += 1;
        let id = self.next_quarantine_id;
        self.quarantine.push(QuarantineRow {
            id,
            raw,
            error_detail: detail,
        });
    }
}

fn portfolio_hash(portfolio_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    portfolio_id.hash(&mut hasher);
    hasher.finish()
}

/// The in-memory store.
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    locks: Arc<Mutex<HashMap<u64, u64>>>,
    txn_counter: AtomicU64,
    fail_batches: Mutex<VecDeque<Error>>,
    fail_singles: Mutex<VecDeque<Error>>,
    fail_single_for: Mutex<HashMap<String, Error>>,
    fail_quarantines: Mutex<VecDeque<Error>>,
    fail_begins: Mutex<VecDeque<Error>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            txn_counter: AtomicU64::new(0),
            fail_batches: Mutex::new(VecDeque::new()),
            fail_singles: Mutex::new(VecDeque::new()),
            fail_single_for: Mutex::new(HashMap::new()),
            fail_quarantines: Mutex::new(VecDeque::new()),
            fail_begins: Mutex::new(VecDeque::new()),
        }
    }

    // -- failure injection ---------------------------------------------------

    /// The next `persist_batch` call fails with this error.
    pub fn fail_next_batch(&self, err: Error) {
        self.fail_batches.lock().push_back(err);
    }

    /// The next `persist_single` call fails with this error.
    pub fn fail_next_single(&self, err: Error) {
        self.fail_singles.lock().push_back(err);
    }

    /// `persist_single` for this trade id fails once with this error.
    pub fn fail_single_for(&self, trade_id: &str, err: Error) {
        self.fail_single_for.lock().insert(trade_id.to_string(), err);
    }

    /// The next `quarantine_isolated` call fails with this error.
    pub fn fail_next_quarantine(&self, err: Error) {
        self.fail_quarantines.lock().push_back(err);
    }

    /// The next `begin` call fails with this error.
    pub fn fail_next_begin(&self, err: Error) {
        self.fail_begins.lock().push_back(err);
    }

    // -- seeding -------------------------------------------------------------

    /// Insert a PENDING outbox row directly, bypassing ingestion.
    pub fn seed_outbox(&self, portfolio_id: &str, trade_id: &str, payload: Bytes) -> i64 {
        self.state
            .lock()
            .insert_outbox(portfolio_id, trade_id, payload)
    }

    // -- inspection ----------------------------------------------------------

    pub fn audit_rows(&self) -> Vec<AuditRow> {
        self.state.lock().audit.clone()
    }

    pub fn outbox_rows(&self) -> Vec<OutboxRow> {
        self.state.lock().outbox.clone()
    }

    pub fn quarantine_rows(&self) -> Vec<QuarantineRow> {
        self.state.lock().quarantine.clone()
    }

    pub fn pending_ids(&self) -> Vec<i64> {
        self.state
            .lock()
            .outbox
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending)
            .map(|r| r.id)
            .collect()
    }

    pub fn sent_rows(&self) -> Vec<OutboxRow> {
        self.state
            .lock()
            .outbox
            .iter()
            .filter(|r| r.status == OutboxStatus::Sent)
            .cloned()
            .collect()
    }

    /// Portfolio hashes currently locked by open dispatch transactions.
    pub fn held_locks(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngressStore for MemoryStore {
    async fn persist_batch(&self, batch: &[PendingMessage]) -> Result<()> {
        if let Some(err) = self.fail_batches.lock().pop_front() {
            return Err(err);
        }

        let mut state = self.state.lock();

        // Uniqueness check first so a violation applies nothing.
        let mut seen: Vec<&str> = Vec::new();
        for msg in batch {
            if let Some(trade) = msg.trade() {
                let trade_id = trade.trade_id.as_str();
                if state.has_valid_trade(trade_id) || seen.contains(&trade_id) {
                    return Err(Error::Integrity(format!(
                        "duplicate key value violates unique constraint: trade_id={trade_id}"
                    )));
                }
                seen.push(trade_id);
            }
        }

        for msg in batch {
            state.insert_audit(msg);
            match msg.body() {
                MessageBody::Valid(trade) => {
                    state.insert_outbox(
                        trade.portfolio_id.as_str(),
                        trade.trade_id.as_str(),
                        msg.raw().clone(),
                    );
                }
                MessageBody::Invalid { reason } => {
                    state.insert_quarantine(msg.raw().clone(), reason.clone());
                }
            }
        }
        Ok(())
    }

    async fn persist_single(&self, msg: &PendingMessage) -> Result<()> {
        if let Some(err) = self.fail_singles.lock().pop_front() {
            return Err(err);
        }
        if let Some(trade) = msg.trade() {
            if let Some(err) = self.fail_single_for.lock().remove(trade.trade_id.as_str()) {
                return Err(err);
            }
        }

        let mut state = self.state.lock();
        match msg.body() {
            MessageBody::Valid(trade) => {
                if state.has_valid_trade(trade.trade_id.as_str()) {
                    // Idempotent duplicate: absorbed, no outbox emit.
                    return Ok(());
                }
                state.insert_audit(msg);
                state.insert_outbox(
                    trade.portfolio_id.as_str(),
                    trade.trade_id.as_str(),
                    msg.raw().clone(),
                );
            }
            MessageBody::Invalid { reason } => {
                state.insert_audit(msg);
                state.insert_quarantine(msg.raw().clone(), reason.clone());
            }
        }
        Ok(())
    }

    async fn quarantine_isolated(&self, entry: QuarantineEntry) -> Result<()> {
        if let Some(err) = self.fail_quarantines.lock().pop_front() {
            return Err(err);
        }
        self.state
            .lock()
            .insert_quarantine(entry.raw_message, entry.error_detail);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn OutboxTxn>> {
        if let Some(err) = self.fail_begins.lock().pop_front() {
            return Err(err);
        }
        let txn_id = self.txn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MemoryTxn {
            state: Arc::clone(&self.state),
            locks: Arc::clone(&self.locks),
            txn_id,
            held: Vec::new(),
            staged_sent: Vec::new(),
            staged_quarantine: Vec::new(),
            released: false,
        }))
    }
}

/// One open dispatch transaction over [`MemoryStore`].
pub struct MemoryTxn {
    state: Arc<Mutex<State>>,
    locks: Arc<Mutex<HashMap<u64, u64>>>,
    txn_id: u64,
    held: Vec<u64>,
    staged_sent: Vec<i64>,
    staged_quarantine: Vec<(i64, QuarantineEntry)>,
    released: bool,
}

impl MemoryTxn {
    fn release_locks(&mut self) {
        if self.released {
            return;
        }
        let mut locks = self.locks.lock();
        for key in self.held.drain(..) {
            if locks.get(&key) == Some(&self.txn_id) {
                locks.remove(&key);
            }
        }
        self.released = true;
    }
}

#[async_trait]
impl OutboxTxn for MemoryTxn {
    async fn fetch_pending(&mut self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let state = self.state.lock();
        let mut locks = self.locks.lock();

        let mut rows: Vec<&OutboxRow> = state
            .outbox
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending && !self.staged_sent.contains(&r.id))
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.id));

        let mut result = Vec::new();
        for row in rows {
            if result.len() >= limit {
                break;
            }
            let key = portfolio_hash(&row.portfolio_id);
            match locks.get(&key) {
                Some(owner) if *owner != self.txn_id => continue,
                Some(_) => {}
                None => {
                    locks.insert(key, self.txn_id);
                    self.held.push(key);
                }
            }
            result.push(OutboxEntry {
                id: row.id,
                created_at: row.created_at,
                portfolio_id: PortfolioId::new(row.portfolio_id.clone()),
                trade_id: TradeId::new(row.trade_id.clone()),
                payload: row.payload.clone(),
                status: row.status,
                sent_at: row.sent_at,
            });
        }
        Ok(result)
    }

    async fn mark_sent(&mut self, ids: &[i64]) -> Result<usize> {
        self.staged_sent.extend_from_slice(ids);
        Ok(ids.len())
    }

    async fn quarantine(&mut self, entry: &OutboxEntry, detail: &QuarantineEntry) -> Result<()> {
        self.staged_quarantine.push((entry.id, detail.clone()));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            let now = Utc::now();
            for id in &self.staged_sent {
                if let Some(row) = state.outbox.iter_mut().find(|r| r.id == *id) {
                    row.status = OutboxStatus::Sent;
                    row.sent_at = Some(now);
                }
            }
            for (entry_id, detail) in self.staged_quarantine.drain(..) {
                state.insert_quarantine(detail.raw_message, detail.error_detail);
                state.outbox.retain(|r| r.id != entry_id);
            }
        }
        self.release_locks();
        Ok(())
    }
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        // Rollback semantics: staged work is discarded, locks released.
        self.release_locks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{invalid_message, sample_trade, valid_message};

    #[tokio::test]
    async fn batch_persist_is_transactional_on_duplicates() {
        let store = MemoryStore::new();
        let first = valid_message(&sample_trade("pf-1", "t-1"), 0);
        store.persist_batch(&[first.clone()]).await.unwrap();

        // Batch containing a duplicate applies nothing.
        let fresh = valid_message(&sample_trade("pf-1", "t-2"), 1);
        let dup = valid_message(&sample_trade("pf-1", "t-1"), 2);
        let err = store.persist_batch(&[fresh, dup]).await.unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
        assert_eq!(store.audit_rows().len(), 1);
        assert_eq!(store.outbox_rows().len(), 1);
    }

    #[tokio::test]
    async fn single_persist_absorbs_duplicates_without_outbox_emit() {
        let store = MemoryStore::new();
        let msg = valid_message(&sample_trade("pf-1", "t-1"), 0);
        store.persist_single(&msg).await.unwrap();
        store.persist_single(&msg).await.unwrap();
        assert_eq!(store.audit_rows().len(), 1);
        assert_eq!(store.outbox_rows().len(), 1);
    }

    #[tokio::test]
    async fn invalid_messages_audit_and_quarantine_without_outbox() {
        let store = MemoryStore::new();
        let msg = invalid_message(b"\xde\xad", 0);
        store.persist_batch(&[msg]).await.unwrap();
        assert_eq!(store.audit_rows().len(), 1);
        assert!(!store.audit_rows()[0].valid);
        assert_eq!(store.quarantine_rows().len(), 1);
        assert!(store.outbox_rows().is_empty());
    }

    #[tokio::test]
    async fn fetch_pending_filters_portfolios_locked_elsewhere() {
        let store = MemoryStore::new();
        store.seed_outbox("pf-a", "t-1", Bytes::from_static(b"p1"));
        store.seed_outbox("pf-b", "t-2", Bytes::from_static(b"p2"));

        let mut txn1 = store.begin().await.unwrap();
        let batch1 = txn1.fetch_pending(10).await.unwrap();
        assert_eq!(batch1.len(), 2);

        // A concurrent transaction sees nothing while the locks are held.
        let mut txn2 = store.begin().await.unwrap();
        let batch2 = txn2.fetch_pending(10).await.unwrap();
        assert!(batch2.is_empty());

        // Rollback releases the locks.
        drop(txn1);
        let batch3 = txn2.fetch_pending(10).await.unwrap();
        assert_eq!(batch3.len(), 2);
    }

    #[tokio::test]
    async fn commit_applies_staged_work_and_releases_locks() {
        let store = MemoryStore::new();
        let id = store.seed_outbox("pf-a", "t-1", Bytes::from_static(b"p1"));

        let mut txn = store.begin().await.unwrap();
        let batch = txn.fetch_pending(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        txn.mark_sent(&[id]).await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(store.held_locks(), 0);
        let rows = store.sent_rows();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].sent_at.is_some());
    }

    #[tokio::test]
    async fn rollback_discards_staged_work() {
        let store = MemoryStore::new();
        let id = store.seed_outbox("pf-a", "t-1", Bytes::from_static(b"p1"));

        let mut txn = store.begin().await.unwrap();
        txn.fetch_pending(10).await.unwrap();
        txn.mark_sent(&[id]).await.unwrap();
        drop(txn); // crash before commit

        assert_eq!(store.pending_ids(), vec![id]);
        assert_eq!(store.held_locks(), 0);
    }

    #[tokio::test]
    async fn quarantine_in_txn_removes_outbox_row() {
        let store = MemoryStore::new();
        let id = store.seed_outbox("pf-a", "t-1", Bytes::from_static(b"bad"));

        let mut txn = store.begin().await.unwrap();
        let batch = txn.fetch_pending(10).await.unwrap();
        let detail = QuarantineEntry::new(batch[0].payload.clone(), "Poison Pill: decode failure");
        txn.quarantine(&batch[0], &detail).await.unwrap();
        txn.commit().await.unwrap();

        assert!(store.outbox_rows().iter().all(|r| r.id != id));
        assert_eq!(store.quarantine_rows().len(), 1);
    }
}
