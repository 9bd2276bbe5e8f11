//! Crate-wide error type.
//!
//! A handful of named variants for conditions the core itself detects,
//! plus a `Generic` catch-all for errors surfaced by whatever `Transport`
//! implementation a caller plugs in.

use thiserror::Error;

pub type Result<T, E = QueueError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] redis::RedisError),

    #[error("lease for recipient {recipient_id} was lost or held by another worker")]
    LeaseLost { recipient_id: String },

    #[error("malformed queue payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Generic(Box<dyn std::error::Error + Send + Sync>),
}

impl QueueError {
    /// Wraps an arbitrary transport or backend error, matching the
    /// `QueueError::generic` helper convention used across this
    /// codebase's Redis and Pub/Sub integrations.
    pub fn generic(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Generic(Box::new(e))
    }
}
