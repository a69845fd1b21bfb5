//! Bounded ingestion buffer between the stream handler and the flusher.
//!
//! Single producer (the ingest loop; the admin replay endpoint borrows its
//! handle), single consumer (the flush loop), FIFO in enqueue order, which
//! is source-stream offset order. The flusher drains in batches sized by
//! the adaptive controller, triggered by size or by the flush interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info};

use crate::domain::PendingMessage;
use crate::error::{Error, Result};

use super::persistence::PersistenceCore;
use super::sizer::AdaptiveBatchSizer;

/// What happened to an enqueue attempt.
#[derive(Debug)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The buffer stayed full past the bounded wait while shutdown was in
    /// progress; the caller must quarantine the returned message.
    RejectedShuttingDown(PendingMessage),
}

/// Producer-side handle to the buffer.
#[derive(Clone)]
pub struct BufferHandle {
    tx: mpsc::Sender<PendingMessage>,
    enqueue_wait: Duration,
    shutting_down: Arc<AtomicBool>,
}

impl BufferHandle {
    /// Enqueue with a bounded wait.
    ///
    /// When the buffer is full the call waits up to the configured bound;
    /// if it is still full and shutdown has begun, the message is handed
    /// back for quarantine. Otherwise the call blocks until space frees
    /// up, which stalls the producer and thereby pauses the stream.
    pub async fn enqueue(&self, msg: PendingMessage) -> Result<EnqueueOutcome> {
        match self.tx.send_timeout(msg, self.enqueue_wait).await {
            Ok(()) => Ok(EnqueueOutcome::Enqueued),
            Err(SendTimeoutError::Timeout(msg)) => {
                if self.shutting_down.load(Ordering::SeqCst) {
                    Ok(EnqueueOutcome::RejectedShuttingDown(msg))
                } else {
                    debug!("Ingestion buffer full; blocking producer");
                    self.tx
                        .send(msg)
                        .await
                        .map_err(|_| Error::Stream("ingestion buffer closed".into()))?;
                    Ok(EnqueueOutcome::Enqueued)
                }
            }
            Err(SendTimeoutError::Closed(msg)) => {
                if self.shutting_down.load(Ordering::SeqCst) {
                    Ok(EnqueueOutcome::RejectedShuttingDown(msg))
                } else {
                    Err(Error::Stream("ingestion buffer closed".into()))
                }
            }
        }
    }

    /// Flag shutdown so a full buffer rejects instead of blocking forever.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Queue slots currently in use.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every slot is taken and the next enqueue will wait.
    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }
}

/// Consumer side: drains the buffer and feeds the persistence core.
pub struct FlushLoop {
    rx: mpsc::Receiver<PendingMessage>,
    persistence: Arc<PersistenceCore>,
    sizer: AdaptiveBatchSizer,
    flush_interval: Duration,
}

/// Create the buffer pair with the given queue capacity.
pub fn ingestion_buffer(
    capacity: usize,
    enqueue_wait: Duration,
    flush_interval: Duration,
    persistence: Arc<PersistenceCore>,
    sizer: AdaptiveBatchSizer,
) -> (BufferHandle, FlushLoop) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = BufferHandle {
        tx,
        enqueue_wait,
        shutting_down: Arc::new(AtomicBool::new(false)),
    };
    let flusher = FlushLoop {
        rx,
        persistence,
        sizer,
        flush_interval,
    };
    (handle, flusher)
}

impl FlushLoop {
    /// Run until every producer handle is dropped and the queue is drained.
    ///
    /// Must run as a single task: serial flushing is what preserves
    /// per-portfolio source order into the outbox.
    pub async fn run(mut self) {
        loop {
            // Block for the first message of the next batch; an idle
            // interval resets the adaptive size.
            let first = match timeout(self.flush_interval, self.rx.recv()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(_) => {
                    self.sizer.reset();
                    continue;
                }
            };

            let target = self.sizer.current_size().max(1);
            let mut batch = Vec::with_capacity(target);
            batch.push(first);

            let mut closed = false;
            let deadline = Instant::now() + self.flush_interval;
            while batch.len() < target {
                match timeout_at(deadline, self.rx.recv()).await {
                    Ok(Some(msg)) => batch.push(msg),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break, // flush interval elapsed
                }
            }

            let started = Instant::now();
            self.persistence.flush(&batch).await;
            self.sizer.adjust(started.elapsed(), batch.len());

            if closed {
                break;
            }
        }
        info!("Ingestion flush loop stopped");
    }
}
