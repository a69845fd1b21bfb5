//! Configuration loading tests.

use std::io::Write;

use tradecap::infrastructure::config::Config;

const FULL: &str = r#"
[ingest]
buffer_capacity = 10000
enqueue_wait_ms = 250
flush_interval_ms = 200
retry_backoff_ms = 500
last_resort_path = "tradecap-lost.jsonl"

[batch]
min = 10
max = 500
target_latency_ms = 100

[dispatch]
publish_timeout_ms = 5000
system_failure_backoff_ms = 1000
max_backoff_ms = 30000
idle_interval_ms = 50

[breaker]
failure_rate = 0.5
min_calls = 10
open_duration_ms = 10000
half_open_trials = 3

[stream]
brokers = "kafka-1:9092,kafka-2:9092"
stream_name = "trades.inbound"
consumer_name = "tradecap"

[bus]
brokers = "kafka-1:9092"
dest_topic = "trades.captured"
lifecycle_topic = "lifecycle.event"

[store]
url = "postgres://pms@db/tradecap"
pool_size = 8

[admin]
bind = "0.0.0.0:8085"

[logging]
level = "debug"
format = "json"
"#;

#[test]
fn full_config_file_loads() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.stream.brokers, "kafka-1:9092,kafka-2:9092");
    assert_eq!(config.bus.lifecycle_topic, "lifecycle.event");
    assert_eq!(config.store.pool_size, 8);
    assert_eq!(config.batch.max, 500);
    assert_eq!(config.logging.format, "json");
}

#[test]
fn missing_file_is_a_config_error() {
    let err = Config::load("/definitely/not/here.toml").unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn missing_section_is_rejected() {
    let without_store: String = FULL
        .lines()
        .filter(|line| !line.starts_with("[store]") && !line.contains("postgres://") && !line.contains("pool_size"))
        .collect::<Vec<_>>()
        .join("\n");
    assert!(Config::parse_toml(&without_store).is_err());
}

#[test]
fn zero_capacity_is_rejected() {
    let bad = FULL.replace("buffer_capacity = 10000", "buffer_capacity = 0");
    let err = Config::parse_toml(&bad).unwrap_err();
    assert!(err.to_string().contains("buffer_capacity"));
}

#[test]
fn backoff_ceiling_must_dominate_initial() {
    let bad = FULL.replace("max_backoff_ms = 30000", "max_backoff_ms = 100");
    let err = Config::parse_toml(&bad).unwrap_err();
    assert!(err.to_string().contains("max_backoff_ms"));
}
