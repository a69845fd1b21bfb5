//! Application configuration loading and validation.
//!
//! Settings come from a TOML file; the store URL may be overridden through
//! the `TRADECAP_STORE_URL` environment variable so credentials stay out of
//! the file. Validation runs at load time and any violation is fatal at
//! startup.

pub mod logging;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub use logging::LoggingConfig;

/// Ingestion buffer and flush settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Buffer queue capacity (C).
    pub buffer_capacity: usize,
    /// Bounded enqueue wait before backpressure blocks (Tw).
    pub enqueue_wait_ms: u64,
    /// Forced flush cadence (Tflush).
    pub flush_interval_ms: u64,
    /// Sleep between retries of a failed batch flush.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// JSON-lines file for messages lost to the store.
    #[serde(default = "default_last_resort_path")]
    pub last_resort_path: String,
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_last_resort_path() -> String {
    "tradecap-lost.jsonl".to_string()
}

/// Adaptive batch sizing bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub min: usize,
    pub max: usize,
    pub target_latency_ms: u64,
}

/// Dispatcher timing.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    /// Downstream publish deadline (Tpub).
    pub publish_timeout_ms: u64,
    /// Initial backoff after a system failure (B0).
    pub system_failure_backoff_ms: u64,
    pub max_backoff_ms: u64,
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

fn default_idle_interval_ms() -> u64 {
    50
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    pub failure_rate: f64,
    pub min_calls: usize,
    pub open_duration_ms: u64,
    pub half_open_trials: u32,
}

/// Source-stream identity.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub brokers: String,
    pub stream_name: String,
    pub consumer_name: String,
}

/// Downstream bus identity.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub brokers: String,
    pub dest_topic: String,
    /// Lifecycle event topic; emission is disabled when empty.
    #[serde(default)]
    pub lifecycle_topic: String,
}

/// Durable store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    5
}

/// Admin HTTP settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub bind: String,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ingest: IngestConfig,
    pub batch: BatchConfig,
    pub dispatch: DispatchSettings,
    pub breaker: BreakerSettings,
    pub stream: StreamConfig,
    pub bus: BusConfig,
    pub store: StoreConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;

        if let Ok(url) = std::env::var("TRADECAP_STORE_URL") {
            config.store.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed
    /// or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config(e.to_string()))?;
        Self::parse_toml(&content)
    }

    fn validate(&self) -> Result<()> {
        fn invalid(field: &str, reason: &str) -> Error {
            Error::Config(format!("{field}: {reason}"))
        }

        if self.ingest.buffer_capacity == 0 {
            return Err(invalid("ingest.buffer_capacity", "must be greater than 0"));
        }
        if self.ingest.flush_interval_ms == 0 {
            return Err(invalid("ingest.flush_interval_ms", "must be greater than 0"));
        }
        if self.batch.min == 0 {
            return Err(invalid("batch.min", "must be greater than 0"));
        }
        if self.batch.max < self.batch.min {
            return Err(invalid("batch.max", "must be >= batch.min"));
        }
        if self.batch.target_latency_ms == 0 {
            return Err(invalid("batch.target_latency_ms", "must be greater than 0"));
        }
        if self.dispatch.publish_timeout_ms == 0 {
            return Err(invalid("dispatch.publish_timeout_ms", "must be greater than 0"));
        }
        if self.dispatch.system_failure_backoff_ms == 0 {
            return Err(invalid(
                "dispatch.system_failure_backoff_ms",
                "must be greater than 0",
            ));
        }
        if self.dispatch.max_backoff_ms < self.dispatch.system_failure_backoff_ms {
            return Err(invalid(
                "dispatch.max_backoff_ms",
                "must be >= system_failure_backoff_ms",
            ));
        }
        if !(self.breaker.failure_rate > 0.0 && self.breaker.failure_rate <= 1.0) {
            return Err(invalid("breaker.failure_rate", "must be in (0, 1]"));
        }
        if self.breaker.min_calls == 0 {
            return Err(invalid("breaker.min_calls", "must be greater than 0"));
        }
        if self.breaker.open_duration_ms == 0 {
            return Err(invalid("breaker.open_duration_ms", "must be greater than 0"));
        }
        if self.breaker.half_open_trials == 0 {
            return Err(invalid("breaker.half_open_trials", "must be greater than 0"));
        }
        if self.stream.brokers.is_empty() {
            return Err(invalid("stream.brokers", "must not be empty"));
        }
        if self.stream.stream_name.is_empty() {
            return Err(invalid("stream.stream_name", "must not be empty"));
        }
        if self.stream.consumer_name.is_empty() {
            return Err(invalid("stream.consumer_name", "must not be empty"));
        }
        if self.bus.brokers.is_empty() {
            return Err(invalid("bus.brokers", "must not be empty"));
        }
        if self.bus.dest_topic.is_empty() {
            return Err(invalid("bus.dest_topic", "must not be empty"));
        }
        if self.store.url.is_empty() {
            return Err(invalid("store.url", "must not be empty"));
        }
        if self.store.pool_size == 0 {
            return Err(invalid("store.pool_size", "must be greater than 0"));
        }
        if self.admin.bind.is_empty() {
            return Err(invalid("admin.bind", "must not be empty"));
        }
        Ok(())
    }

    pub fn init_logging(&self) {
        self.logging.init();
    }

    pub fn enqueue_wait(&self) -> Duration {
        Duration::from_millis(self.ingest.enqueue_wait_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.ingest.flush_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.ingest.retry_backoff_ms)
    }

    pub fn target_latency(&self) -> Duration {
        Duration::from_millis(self.batch.target_latency_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.publish_timeout_ms)
    }
}
