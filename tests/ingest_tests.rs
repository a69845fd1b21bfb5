//! Ingestion scenarios: persistence fallback levels, breaker behavior,
//! offset acknowledgement rules.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tradecap::application::ingest::{
    AdaptiveBatchSizer, BreakerConfig, CircuitBreaker, LastResortLog, PersistenceCore,
};
use tradecap::domain::{PendingMessage, REPLAY_OFFSET};
use tradecap::error::Error;
use tradecap::infrastructure::metrics::PipelineMetrics;
use tradecap::port::lifecycle::NoopLifecycleEmitter;
use tradecap::port::store::IngressStore;
use tradecap::testkit::store::MemoryStore;
use tradecap::testkit::stream::RecordingOffsetStore;
use tradecap::testkit::{invalid_message, sample_trade, valid_message};

use support::{permissive_breaker, persistence_core};

fn core_with_breaker(
    store: Arc<MemoryStore>,
    offsets: Arc<RecordingOffsetStore>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<PipelineMetrics>,
    lost_path: std::path::PathBuf,
) -> PersistenceCore {
    PersistenceCore::new(
        store as Arc<dyn IngressStore>,
        offsets,
        breaker,
        Arc::new(NoopLifecycleEmitter),
        metrics,
        LastResortLog::new(lost_path),
        Duration::from_millis(10),
    )
}

// ---------------------------------------------------------------------------
// Offset acknowledgement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offset_is_stored_only_after_batch_lands() {
    let store = Arc::new(MemoryStore::new());
    let offsets = RecordingOffsetStore::new();
    let metrics = PipelineMetrics::new();
    let core = persistence_core(
        Arc::clone(&store),
        Arc::clone(&offsets) as _,
        permissive_breaker(),
        Arc::clone(&metrics),
    );

    // One transient failure first: the batch must survive it, and no
    // offset may be stored before the store accepts the rows.
    store.fail_next_batch(Error::Connection("store down".into()));

    let batch = vec![
        valid_message(&sample_trade("pf-1", "t-1"), 10),
        valid_message(&sample_trade("pf-1", "t-2"), 11),
    ];
    core.flush(&batch).await;

    assert_eq!(offsets.stored().len(), 1, "one ack per batch");
    assert_eq!(offsets.last_offset(), Some(11), "acked to the last message");
    assert_eq!(store.outbox_rows().len(), 2);
    assert_eq!(metrics.snapshot().ingest_retries, 1);
}

#[tokio::test]
async fn empty_flush_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let offsets = RecordingOffsetStore::new();
    let core = persistence_core(
        Arc::clone(&store),
        Arc::clone(&offsets) as _,
        permissive_breaker(),
        PipelineMetrics::new(),
    );

    core.flush(&[]).await;

    assert!(offsets.stored().is_empty());
    assert!(store.audit_rows().is_empty());
}

#[tokio::test]
async fn all_invalid_batch_quarantines_and_still_advances_offset() {
    let store = Arc::new(MemoryStore::new());
    let offsets = RecordingOffsetStore::new();
    let metrics = PipelineMetrics::new();
    let core = persistence_core(
        Arc::clone(&store),
        Arc::clone(&offsets) as _,
        permissive_breaker(),
        Arc::clone(&metrics),
    );

    let batch = vec![invalid_message(b"\xff\x01", 5), invalid_message(b"\xff\x02", 6)];
    core.flush(&batch).await;

    assert!(store.outbox_rows().is_empty(), "no outbox for invalid rows");
    assert_eq!(store.quarantine_rows().len(), 2);
    assert_eq!(store.audit_rows().len(), 2);
    assert!(store.audit_rows().iter().all(|r| !r.valid));
    assert_eq!(offsets.last_offset(), Some(6));
    assert_eq!(metrics.snapshot().ingest_quarantined, 2);
}

#[tokio::test]
async fn replay_messages_never_advance_offsets() {
    let store = Arc::new(MemoryStore::new());
    let offsets = RecordingOffsetStore::new();
    let core = persistence_core(
        Arc::clone(&store),
        Arc::clone(&offsets) as _,
        permissive_breaker(),
        PipelineMetrics::new(),
    );

    // A batch of only replayed messages stores nothing.
    let trade = sample_trade("pf-1", "t-replay");
    let replay = PendingMessage::valid(
        trade.clone(),
        tradecap::codec::encode(&trade),
        REPLAY_OFFSET,
        None,
    );
    core.flush(&[replay.clone()]).await;
    assert!(offsets.stored().is_empty());
    assert_eq!(store.outbox_rows().len(), 1);

    // Mixed batch: the ack comes from the last message with a handle.
    let batch = vec![valid_message(&sample_trade("pf-1", "t-next"), 42), replay];
    core.flush(&batch).await;
    assert_eq!(offsets.last_offset(), Some(42));
}

// ---------------------------------------------------------------------------
// Fallback levels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_in_batch_falls_back_to_per_item_and_absorbs() {
    let store = Arc::new(MemoryStore::new());
    let offsets = RecordingOffsetStore::new();
    let core = persistence_core(
        Arc::clone(&store),
        Arc::clone(&offsets) as _,
        permissive_breaker(),
        PipelineMetrics::new(),
    );

    // t-1 is already persisted; redelivering it inside a batch trips the
    // batch transaction into the per-item path.
    core.flush(&[valid_message(&sample_trade("pf-1", "t-1"), 0)])
        .await;

    let batch = vec![
        valid_message(&sample_trade("pf-1", "t-2"), 1),
        valid_message(&sample_trade("pf-1", "t-1"), 2), // duplicate
        valid_message(&sample_trade("pf-1", "t-3"), 3),
    ];
    core.flush(&batch).await;

    // The duplicate was absorbed: one audit row and one outbox row for
    // t-1, fresh rows for t-2 and t-3, offset advanced past the batch.
    let audit_ids: Vec<String> = store
        .audit_rows()
        .iter()
        .map(|r| r.trade_id.clone())
        .collect();
    assert_eq!(
        audit_ids.iter().filter(|id| id.as_str() == "t-1").count(),
        1,
        "duplicate absorbed without a second audit row"
    );
    let mut outbox_ids: Vec<String> = store
        .outbox_rows()
        .iter()
        .map(|r| r.trade_id.clone())
        .collect();
    outbox_ids.sort();
    assert_eq!(outbox_ids, vec!["t-1", "t-2", "t-3"]);
    assert_eq!(offsets.last_offset(), Some(3));
    assert!(store.quarantine_rows().is_empty());
}

#[tokio::test]
async fn integrity_error_on_single_routes_to_quarantine() {
    let store = Arc::new(MemoryStore::new());
    let offsets = RecordingOffsetStore::new();
    let metrics = PipelineMetrics::new();
    let core = persistence_core(
        Arc::clone(&store),
        Arc::clone(&offsets) as _,
        permissive_breaker(),
        Arc::clone(&metrics),
    );

    // Force the batch path down to per-item, then fail one item with a
    // non-duplicate integrity error.
    store.fail_next_batch(Error::Integrity("constraint violated".into()));
    store.fail_single_for("t-bad", Error::Integrity("check constraint".into()));

    let batch = vec![
        valid_message(&sample_trade("pf-1", "t-ok"), 1),
        valid_message(&sample_trade("pf-1", "t-bad"), 2),
    ];
    core.flush(&batch).await;

    assert_eq!(store.outbox_rows().len(), 1);
    assert_eq!(store.outbox_rows()[0].trade_id, "t-ok");
    assert_eq!(store.quarantine_rows().len(), 1);
    assert!(store.quarantine_rows()[0]
        .error_detail
        .contains("Data integrity failure"));
    assert_eq!(offsets.last_offset(), Some(2), "offset still advances");
    assert_eq!(metrics.snapshot().ingest_quarantined, 1);
}

#[tokio::test]
async fn quarantine_failure_falls_to_disk_log() {
    let dir = tempfile::tempdir().unwrap();
    let lost_path = dir.path().join("lost.jsonl");

    let store = Arc::new(MemoryStore::new());
    let offsets = RecordingOffsetStore::new();
    let metrics = PipelineMetrics::new();
    let core = core_with_breaker(
        Arc::clone(&store),
        Arc::clone(&offsets),
        permissive_breaker(),
        Arc::clone(&metrics),
        lost_path.clone(),
    );

    store.fail_next_batch(Error::Integrity("constraint violated".into()));
    store.fail_single_for("t-doomed", Error::Integrity("bad row".into()));
    store.fail_next_quarantine(Error::Database("quarantine insert failed".into()));

    core.flush(&[valid_message(&sample_trade("pf-1", "t-doomed"), 7)])
        .await;

    // Swallowed, but recorded on disk with the hex payload.
    assert_eq!(metrics.snapshot().lost_to_disk, 1);
    let contents = std::fs::read_to_string(&lost_path).unwrap();
    let record: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert!(record["payload_hex"].as_str().unwrap().len() > 0);
    assert!(record["reason"]
        .as_str()
        .unwrap()
        .contains("Data integrity failure"));
    // The flush still completes and acks.
    assert_eq!(offsets.last_offset(), Some(7));
}

// ---------------------------------------------------------------------------
// Circuit breaker at ingress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_outage_opens_breaker_then_replays_same_batch() {
    let store = Arc::new(MemoryStore::new());
    let offsets = RecordingOffsetStore::new();
    let metrics = PipelineMetrics::new();
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_rate: 1.0,
        min_calls: 2,
        open_duration: Duration::from_millis(50),
        half_open_trials: 1,
    }));
    let core = persistence_core(
        Arc::clone(&store),
        Arc::clone(&offsets) as _,
        Arc::clone(&breaker),
        Arc::clone(&metrics),
    );

    // Two connection failures open the circuit; the same batch must be
    // replayed untouched once the store recovers.
    store.fail_next_batch(Error::Connection("refused".into()));
    store.fail_next_batch(Error::Connection("refused".into()));

    let batch = vec![
        valid_message(&sample_trade("pf-1", "t-1"), 1),
        valid_message(&sample_trade("pf-1", "t-2"), 2),
    ];
    core.flush(&batch).await;

    assert_eq!(store.outbox_rows().len(), 2, "batch landed after recovery");
    assert_eq!(offsets.last_offset(), Some(2));
    // Retries: two real failures plus at least one refused call while open.
    assert!(metrics.snapshot().ingest_retries >= 3);
    assert!(!breaker.is_open(), "breaker closed after successful trial");
}

// ---------------------------------------------------------------------------
// Sizer integration sanity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sizer_bounds_are_respected_under_load() {
    let mut sizer = AdaptiveBatchSizer::new(2, 16, Duration::from_millis(50));
    for _ in 0..20 {
        sizer.adjust(Duration::from_millis(1), sizer.current_size());
        assert!(sizer.current_size() <= 16);
    }
    for _ in 0..20 {
        sizer.adjust(Duration::from_millis(500), sizer.current_size());
        assert!(sizer.current_size() >= 2);
    }
}
