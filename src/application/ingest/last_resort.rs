//! Level-4 fallback: structured disk log for messages the store rejected
//! and the quarantine could not absorb.
//!
//! This is the only place in the pipeline where an error is intentionally
//! swallowed. Every record is also emitted as a high-severity log line
//! carrying the hex-encoded payload, so the message remains recoverable
//! even if the file write itself fails.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct LostRecord<'a> {
    failed_at: String,
    reason: &'a str,
    payload_hex: String,
}

/// Append-only JSON-lines log of messages lost to the store.
#[derive(Debug, Clone)]
pub struct LastResortLog {
    path: PathBuf,
}

impl LastResortLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Record a lost message. Never fails; the caller has no fallback left.
    pub fn record(&self, raw: &[u8], reason: &str) {
        let payload_hex = hex::encode(raw);
        error!(
            reason,
            payload_hex = %payload_hex,
            "Message lost to disk log; manual replay required"
        );

        let record = LostRecord {
            failed_at: Utc::now().to_rfc3339(),
            reason,
            payload_hex,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize last-resort record");
                return;
            }
        };

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = result {
            error!(path = %self.path.display(), error = %e, "Failed to append last-resort record");
        }
    }
}
