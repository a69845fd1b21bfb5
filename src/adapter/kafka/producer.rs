//! Kafka-backed downstream bus.
//!
//! Producer settings follow the ordering contract: acks from all replicas,
//! idempotence on, one in-flight request per connection, unbounded client
//! retries. Per-portfolio keys land same-portfolio records in the same
//! partition, and the single in-flight slot keeps their send order.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::error::{Error, Result};
use crate::infrastructure::config::BusConfig;
use crate::port::bus::{EventBus, PublishError};

/// Kafka producer behind the [`EventBus`] port.
pub struct KafkaEventBus {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventBus {
    /// Build the producer. Failure here is fatal at startup.
    pub fn connect(config: &BusConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "1")
            .set("retries", "2147483647")
            .set("linger.ms", "10")
            .set("compression.type", "snappy")
            .create()
            .map_err(|e| Error::Publish(e.to_string()))?;
        Ok(Self {
            producer,
            topic: config.dest_topic.clone(),
        })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, key: &str, payload: &[u8]) -> std::result::Result<(), PublishError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);
        match self.producer.send(record, Timeout::Never).await {
            Ok(_) => Ok(()),
            Err((err, _record)) => Err(map_kafka_error(err)),
        }
    }
}

/// Root-cause a client error into the port's failure kinds.
fn map_kafka_error(err: KafkaError) -> PublishError {
    let detail = err.to_string();
    match err {
        KafkaError::MessageProduction(code) => match code {
            RDKafkaErrorCode::MessageSizeTooLarge | RDKafkaErrorCode::InvalidMessageSize => {
                PublishError::PayloadTooLarge(detail)
            }
            RDKafkaErrorCode::InvalidMessage => PublishError::Serialization(detail),
            RDKafkaErrorCode::InvalidArgument => PublishError::InvalidRecord(detail),
            RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::RequestTimedOut => {
                PublishError::Timeout(detail)
            }
            RDKafkaErrorCode::Interrupted => PublishError::Interrupted(detail),
            RDKafkaErrorCode::BrokerTransportFailure | RDKafkaErrorCode::NetworkException => {
                PublishError::Transport(detail)
            }
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition => PublishError::BrokerUnavailable(detail),
            _ => PublishError::Other(detail),
        },
        KafkaError::Canceled => PublishError::Interrupted(detail),
        _ => PublishError::Other(detail),
    }
}
