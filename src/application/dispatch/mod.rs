//! The dispatcher core: outbox worker, publication engine, classification.

pub mod classify;
pub mod publisher;
pub mod worker;

pub use classify::classify_publish_error;
pub use publisher::PublicationEngine;
pub use worker::{DispatchConfig, DispatchWorker, WorkerHandle};
