//! Kafka-backed source stream.
//!
//! The consumer never auto-stores offsets: `enable.auto.offset.store` is
//! off, so the background auto-commit only ever commits positions the
//! pipeline explicitly stored after persistence. On start the group resumes
//! from its last committed offset.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tracing::{info, warn};

use crate::domain::AckHandle;
use crate::error::{Error, Result};
use crate::infrastructure::config::StreamConfig;
use crate::port::stream::{OffsetStore, StreamMessage, TradeStream};

/// Kafka consumer behind the [`TradeStream`] port.
pub struct KafkaTradeStream {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaTradeStream {
    /// Connect and subscribe. Failure here is fatal at startup.
    pub fn connect(config: &StreamConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_name)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| Error::Stream(e.to_string()))?;
        consumer
            .subscribe(&[config.stream_name.as_str()])
            .map_err(|e| Error::Stream(e.to_string()))?;
        info!(stream = %config.stream_name, consumer = %config.consumer_name, "Source stream subscribed");
        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.stream_name.clone(),
        })
    }

    /// Shareable offset-store handle onto the same consumer.
    pub fn offset_store(&self) -> Arc<dyn OffsetStore> {
        Arc::new(KafkaOffsetStore {
            consumer: Arc::clone(&self.consumer),
            topic: self.topic.clone(),
        })
    }
}

#[async_trait]
impl TradeStream for KafkaTradeStream {
    async fn next_message(&mut self) -> Result<Option<StreamMessage>> {
        match self.consumer.recv().await {
            Ok(message) => {
                let payload = Bytes::copy_from_slice(message.payload().unwrap_or_default());
                let ack = AckHandle {
                    partition: message.partition(),
                    offset: message.offset(),
                };
                Ok(Some(StreamMessage {
                    payload,
                    offset: message.offset(),
                    ack,
                }))
            }
            Err(e) => Err(Error::Stream(e.to_string())),
        }
    }

    fn pause(&self) {
        match self.consumer.assignment() {
            Ok(assignment) => {
                if let Err(e) = self.consumer.pause(&assignment) {
                    warn!(error = %e, "Failed to pause consumer");
                }
            }
            Err(e) => warn!(error = %e, "Failed to read assignment for pause"),
        }
    }

    fn resume(&self) {
        match self.consumer.assignment() {
            Ok(assignment) => {
                if let Err(e) = self.consumer.resume(&assignment) {
                    warn!(error = %e, "Failed to resume consumer");
                }
            }
            Err(e) => warn!(error = %e, "Failed to read assignment for resume"),
        }
    }
}

struct KafkaOffsetStore {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl OffsetStore for KafkaOffsetStore {
    fn store_offset(&self, ack: &AckHandle) -> Result<()> {
        // Commit convention: the stored position is the next offset to read.
        self.consumer
            .store_offset(&self.topic, ack.partition, ack.offset + 1)
            .map_err(|e| Error::Stream(e.to_string()))
    }
}
