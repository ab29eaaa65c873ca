use thiserror::Error;

/// Failures local to a single inbound event. These are reported back to the
/// originating session as an `error` wire event and never cascade to other
/// sessions or terminate the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error("failed to save message: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("session not found")]
    UnknownSession,
}
