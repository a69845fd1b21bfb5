//! Startup wiring and the ingest loop.
//!
//! Dependencies are built in order: store, stream client, downstream bus,
//! lifecycle emitter, breaker, persistence, buffer, dispatcher, then the
//! admin server. Any wiring failure aborts startup with an error, which
//! `main` turns into a nonzero exit.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::adapter::http::{self, AdminState};
use crate::adapter::kafka::{KafkaEventBus, KafkaLifecycleEmitter, KafkaTradeStream};
use crate::adapter::postgres::{self, PgCaptureStore};
use crate::application::dispatch::{DispatchConfig, DispatchWorker, PublicationEngine};
use crate::application::ingest::{
    ingestion_buffer, AdaptiveBatchSizer, BreakerConfig, BufferHandle, CircuitBreaker,
    EnqueueOutcome, LastResortLog, PersistenceCore,
};
use crate::codec;
use crate::domain::{PendingMessage, QuarantineEntry};
use crate::error::Result;
use crate::infrastructure::config::Config;
use crate::infrastructure::metrics::PipelineMetrics;
use crate::port::lifecycle::{LifecycleEmitter, NoopLifecycleEmitter};
use crate::port::store::IngressStore;
use crate::port::stream::{StreamMessage, TradeStream};

/// Wire everything and run until the source stream closes.
pub async fn run(config: Config) -> Result<()> {
    // Durable store first: nothing else is safe to start without it.
    let pool = postgres::create_pool(&config.store.url, config.store.pool_size)?;
    postgres::run_migrations(&pool)?;
    let store = Arc::new(PgCaptureStore::new(pool));
    info!("Capture store ready");

    let mut stream = KafkaTradeStream::connect(&config.stream)?;
    let offsets = stream.offset_store();

    let bus = Arc::new(KafkaEventBus::connect(&config.bus)?);
    let lifecycle: Arc<dyn LifecycleEmitter> = if config.bus.lifecycle_topic.is_empty() {
        Arc::new(NoopLifecycleEmitter)
    } else {
        Arc::new(KafkaLifecycleEmitter::connect(&config.bus)?)
    };

    let metrics = PipelineMetrics::new();

    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_rate: config.breaker.failure_rate,
        min_calls: config.breaker.min_calls,
        open_duration: Duration::from_millis(config.breaker.open_duration_ms),
        half_open_trials: config.breaker.half_open_trials,
    }));

    let persistence = Arc::new(PersistenceCore::new(
        Arc::clone(&store) as Arc<dyn IngressStore>,
        offsets,
        breaker,
        lifecycle,
        Arc::clone(&metrics),
        LastResortLog::new(&config.ingest.last_resort_path),
        config.retry_backoff(),
    ));

    let (buffer, flusher) = ingestion_buffer(
        config.ingest.buffer_capacity,
        config.enqueue_wait(),
        config.flush_interval(),
        persistence,
        AdaptiveBatchSizer::new(config.batch.min, config.batch.max, config.target_latency()),
    );

    let engine = PublicationEngine::new(bus, config.publish_timeout());
    let worker = DispatchWorker::new(
        store.clone(),
        engine,
        AdaptiveBatchSizer::new(config.batch.min, config.batch.max, config.target_latency()),
        DispatchConfig {
            initial_backoff: Duration::from_millis(config.dispatch.system_failure_backoff_ms),
            max_backoff: Duration::from_millis(config.dispatch.max_backoff_ms),
            idle_interval: Duration::from_millis(config.dispatch.idle_interval_ms),
        },
        Arc::clone(&metrics),
    );
    let worker_handle = worker.handle();

    // Dedicated single tasks keep the flusher and the dispatcher serial.
    let flusher_task = tokio::spawn(flusher.run());
    let worker_task = tokio::spawn(worker.run());

    let admin_state = AdminState {
        buffer: buffer.clone(),
    };
    let admin_bind = config.admin.bind.clone();
    let admin_task = tokio::spawn(async move {
        if let Err(e) = http::serve(&admin_bind, admin_state).await {
            error!(error = %e, "Admin server failed");
        }
    });

    info!("tradecap pipeline running");
    let result = ingest_loop(&mut stream, &buffer, store as Arc<dyn IngressStore>).await;

    // Orderly drain: close every producer handle so the flusher finishes
    // the queue, then stop the dispatcher at its iteration boundary.
    buffer.begin_shutdown();
    admin_task.abort();
    drop(buffer);
    if let Err(e) = flusher_task.await {
        warn!(error = %e, "Flush loop join failed");
    }
    worker_handle.stop();
    if let Err(e) = worker_task.await {
        warn!(error = %e, "Dispatcher join failed");
    }

    result
}

/// Drive the source stream into the buffer until it closes.
///
/// Receive errors are transient by contract (the consumer reconnects under
/// the hood), so they log and retry. A full buffer blocks the enqueue,
/// which stops this loop from draining the transport: that is the
/// backpressure path, surfaced to the adapter as an advisory pause.
pub async fn ingest_loop<S: TradeStream>(
    stream: &mut S,
    buffer: &BufferHandle,
    store: Arc<dyn IngressStore>,
) -> Result<()> {
    loop {
        match stream.next_message().await {
            Ok(Some(msg)) => {
                let pending = classify_stream_message(msg);

                let pausing = buffer.is_full();
                if pausing {
                    stream.pause();
                }
                let outcome = buffer.enqueue(pending).await?;
                if pausing {
                    stream.resume();
                }

                if let EnqueueOutcome::RejectedShuttingDown(msg) = outcome {
                    let entry =
                        QuarantineEntry::new(msg.raw().clone(), "buffer-full shutdown");
                    if let Err(e) = store.quarantine_isolated(entry).await {
                        error!(error = %e, offset = msg.offset(), "Failed to quarantine during shutdown");
                    }
                }
            }
            Ok(None) => {
                info!("Source stream closed");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Stream receive failed; retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Classify one raw frame into a pending message.
fn classify_stream_message(msg: StreamMessage) -> PendingMessage {
    match codec::classify(&msg.payload) {
        Ok(trade) => PendingMessage::valid(trade, msg.payload, msg.offset, Some(msg.ack)),
        Err(reason) => {
            warn!(offset = msg.offset, %reason, "Received unclassifiable message");
            PendingMessage::invalid(reason, msg.payload, msg.offset, Some(msg.ack))
        }
    }
}
