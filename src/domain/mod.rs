//! Domain types shared by the ingestion and dispatch cores.

pub mod batch;
pub mod id;
pub mod message;
pub mod outbox;
pub mod trade;

pub use batch::{BatchOutcome, Classification, PoisonPill};
pub use id::{PortfolioId, TradeId};
pub use message::{AckHandle, MessageBody, PendingMessage, REPLAY_OFFSET};
pub use outbox::{
    AuditRecord, OutboxEntry, OutboxStatus, QuarantineEntry, INVALID_TRADE_ID, MAX_ERROR_DETAIL,
};
pub use trade::{Side, TradeEvent};
