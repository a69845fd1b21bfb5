//! tradecap - trade-capture ingress pipeline.
//!
//! Bridges a high-throughput trade stream (append-only log, offset-based
//! consumption) and a durable downstream event bus (partitioned, ordered
//! per key) with at-least-once delivery, strict per-portfolio ordering,
//! poison-pill isolation and graceful degradation under outages.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── domain/          # Trade events, pending messages, outbox records
//! ├── codec/           # Wire codec + message classification
//! ├── port/            # Seams to external collaborators (stream, bus, store)
//! ├── adapter/         # Postgres, Kafka and HTTP admin implementations
//! ├── application/     # The two cores: ingest/ and dispatch/
//! ├── infrastructure/  # Config, metrics, startup wiring
//! └── testkit/         # Scripted mocks and the in-memory store
//! ```

pub mod adapter;
pub mod application;
pub mod codec;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;
pub mod testkit;
