use thiserror::Error;

/// Errors from the stream bus. The two families map directly onto the
/// worker's retry classification: `ConnectionFailed`/`Timeout` are
/// `unavailable`, `Malformed` is `invalid_response` — transport failure
/// versus content the adapter doesn't understand.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("malformed stream payload: {0}")]
    Malformed(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StreamError {
    /// True when the failure is about reaching Redis at all, rather than
    /// the content of a message already delivered.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StreamError::ConnectionFailed(_) | StreamError::Timeout { .. } | StreamError::Redis(_))
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
