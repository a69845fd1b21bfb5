//! The ingestion core: buffer, persistence levels, breaker, batch sizing.

pub mod breaker;
pub mod buffer;
pub mod last_resort;
pub mod persistence;
pub mod sizer;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use buffer::{ingestion_buffer, BufferHandle, EnqueueOutcome, FlushLoop};
pub use last_resort::LastResortLog;
pub use persistence::PersistenceCore;
pub use sizer::AdaptiveBatchSizer;
