//! Lifecycle event emission to a Kafka topic.

use async_trait::async_trait;
use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde_json::json;
use tracing::warn;

use crate::domain::TradeEvent;
use crate::error::{Error, Result};
use crate::infrastructure::config::BusConfig;
use crate::port::lifecycle::LifecycleEmitter;

const SERVICE_NAME: &str = "tradecap";
const STAGE_INGESTION: &str = "INGESTION";

/// Publishes JSON lifecycle envelopes, fire-and-forget.
pub struct KafkaLifecycleEmitter {
    producer: FutureProducer,
    topic: String,
}

impl KafkaLifecycleEmitter {
    pub fn connect(config: &BusConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("linger.ms", "10")
            .create()
            .map_err(|e| Error::Publish(e.to_string()))?;
        Ok(Self {
            producer,
            topic: config.lifecycle_topic.clone(),
        })
    }

    fn emit(&self, key: &str, payload: serde_json::Value) {
        let body = payload.to_string();
        let record = FutureRecord::to(&self.topic).key(key).payload(&body);
        // Delivery is not awaited; a lost lifecycle event is acceptable.
        if let Err((e, _)) = self.producer.send_result(record) {
            warn!(error = %e, "Failed to enqueue lifecycle event");
        }
    }
}

#[async_trait]
impl LifecycleEmitter for KafkaLifecycleEmitter {
    async fn ingestion_succeeded(&self, trade: &TradeEvent) {
        let payload = json!({
            "traceId": trade.trade_id.as_str(),
            "portfolioId": trade.portfolio_id.as_str(),
            "stage": STAGE_INGESTION,
            "status": "SUCCESS",
            "ts": Utc::now().to_rfc3339(),
            "details": {
                "sourceService": SERVICE_NAME,
                "eventType": "INGESTION_PERSISTED",
                "symbol": trade.symbol,
            },
        });
        self.emit(trade.trade_id.as_str(), payload);
    }

    async fn ingestion_failed(&self, trade_id: &str, reason: &str) {
        let payload = json!({
            "traceId": trade_id,
            "stage": STAGE_INGESTION,
            "status": "FAILURE",
            "ts": Utc::now().to_rfc3339(),
            "details": {
                "sourceService": SERVICE_NAME,
                "eventType": "INGESTION_FAILED",
                "errorMessage": reason,
            },
        });
        self.emit(trade_id, payload);
    }
}
