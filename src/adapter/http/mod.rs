//! Admin HTTP surface.
//!
//! One route: `POST /admin/replay/hex` takes a hex-encoded payload,
//! classifies it and injects the resulting pending message into the
//! ingestion buffer with the replay sentinel offset and no ack handle, so
//! the flush containing it never advances the source offset for it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use tracing::{info, warn};

use crate::application::ingest::buffer::{BufferHandle, EnqueueOutcome};
use crate::codec;
use crate::domain::{PendingMessage, REPLAY_OFFSET};

/// Shared state for the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub buffer: BufferHandle,
}

/// Build the admin router.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/replay/hex", post(replay_hex))
        .with_state(state)
}

/// Decode a replay body into a pending message.
///
/// Classification runs here exactly as it does for stream traffic, so a
/// corrupt replay still lands in the audit trail and quarantine.
pub fn parse_replay_body(body: &str) -> std::result::Result<PendingMessage, ()> {
    let raw = hex::decode(body.trim()).map_err(|_| ())?;
    let raw = Bytes::from(raw);
    let msg = match codec::classify(&raw) {
        Ok(trade) => PendingMessage::valid(trade, raw, REPLAY_OFFSET, None),
        Err(reason) => PendingMessage::invalid(reason, raw, REPLAY_OFFSET, None),
    };
    Ok(msg)
}

async fn replay_hex(State(state): State<AdminState>, body: String) -> (StatusCode, &'static str) {
    let Ok(msg) = parse_replay_body(&body) else {
        return (StatusCode::BAD_REQUEST, "Invalid Hex");
    };

    match state.buffer.enqueue(msg).await {
        Ok(EnqueueOutcome::Enqueued) => {
            info!("Replay injected into buffer");
            (StatusCode::OK, "Replay injected into buffer.")
        }
        Ok(EnqueueOutcome::RejectedShuttingDown(_)) => {
            warn!("Replay rejected: shutdown in progress");
            (StatusCode::SERVICE_UNAVAILABLE, "Shutting down")
        }
        Err(e) => {
            warn!(error = %e, "Replay injection failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Injection failed")
        }
    }
}

/// Serve the admin router until the process shuts down.
pub async fn serve(bind: &str, state: AdminState) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(crate::error::Error::Io)?;
    info!(bind, "Admin server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(crate::error::Error::Io)
}
