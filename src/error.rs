use thiserror::Error;

/// Crate-level error type.
///
/// Variants are grouped by how the pipeline reacts to them: data errors are
/// absorbed locally (quarantine, never retried), system errors are retried
/// with backoff, and [`Error::CircuitOpen`] is the breaker's refusal signal
/// that callers translate into stream backpressure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Unique/check constraint violation or other data-integrity failure.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Publish error: {0}")]
    Publish(String),

    /// Raised by the circuit breaker instead of executing the protected call.
    #[error("Call not permitted: circuit breaker is open")]
    CircuitOpen,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures caused by the data itself: retrying can never fix
    /// them, so they are routed to quarantine instead of the breaker.
    pub fn is_data_error(&self) -> bool {
        matches!(self, Error::Integrity(_) | Error::Decode(_))
    }

    /// True for transient infrastructure failures that retry-with-backoff
    /// is expected to resolve.
    pub fn is_system_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Database(_) | Error::Stream(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
