//! Kafka adapters for the stream, bus and lifecycle ports.

pub mod lifecycle;
pub mod producer;
pub mod source;

pub use lifecycle::KafkaLifecycleEmitter;
pub use producer::KafkaEventBus;
pub use source::KafkaTradeStream;
