//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tradecap::application::dispatch::{DispatchConfig, DispatchWorker, PublicationEngine};
use tradecap::application::ingest::{
    AdaptiveBatchSizer, BreakerConfig, CircuitBreaker, LastResortLog, PersistenceCore,
};
use tradecap::infrastructure::metrics::PipelineMetrics;
use tradecap::port::lifecycle::NoopLifecycleEmitter;
use tradecap::port::store::IngressStore;
use tradecap::port::stream::OffsetStore;
use tradecap::testkit::bus::ScriptedBus;
use tradecap::testkit::store::MemoryStore;

/// Poll until `cond` holds or the deadline passes; panics on timeout.
pub async fn wait_until(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Breaker that effectively never opens; for tests not about the breaker.
pub fn permissive_breaker() -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_rate: 1.0,
        min_calls: 1_000_000,
        open_duration: Duration::from_millis(10),
        half_open_trials: 1,
    }))
}

/// Persistence core over the given store and offset sink, fast retries.
pub fn persistence_core(
    store: Arc<MemoryStore>,
    offsets: Arc<dyn OffsetStore>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<PipelineMetrics>,
) -> Arc<PersistenceCore> {
    Arc::new(PersistenceCore::new(
        store as Arc<dyn IngressStore>,
        offsets,
        breaker,
        Arc::new(NoopLifecycleEmitter),
        metrics,
        LastResortLog::new(std::env::temp_dir().join(format!(
            "tradecap-test-lost-{}.jsonl",
            std::process::id()
        ))),
        Duration::from_millis(10),
    ))
}

/// Dispatch worker over the given store and bus with fast test timings.
pub fn dispatch_worker(
    store: Arc<MemoryStore>,
    bus: Arc<ScriptedBus>,
    batch_limit: usize,
) -> DispatchWorker {
    DispatchWorker::new(
        store,
        PublicationEngine::new(bus, Duration::from_millis(100)),
        AdaptiveBatchSizer::new(batch_limit, batch_limit, Duration::from_millis(100)),
        DispatchConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            idle_interval: Duration::from_millis(5),
        },
        PipelineMetrics::new(),
    )
}

/// Extract the subsequence of published trade ids for one portfolio key.
pub fn published_trades_for(bus: &ScriptedBus, portfolio: &str) -> Vec<String> {
    let keys = bus.published_keys();
    let payloads = bus.published_payloads();
    keys.iter()
        .zip(payloads.iter())
        .filter(|(key, _)| key.as_str() == portfolio)
        .filter_map(|(_, payload)| {
            tradecap::codec::classify(payload)
                .ok()
                .map(|t| t.trade_id.as_str().to_string())
        })
        .collect()
}
