use thiserror::Error;

/// A handler's failure, already classified into one of two retry families.
/// Handlers return this instead of a generic error so the worker loop
/// never has to guess which bucket a failure belongs in.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// JSON parse failure, schema validation failure, missing field, or any
    /// unclassified exception.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Connect refused, DNS, timeout, HTTP 5xx, or circuit-broken.
    #[error("llm unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryFamily {
    InvalidResponse,
    Unavailable,
}

impl HandlerError {
    pub fn family(&self) -> RetryFamily {
        match self {
            HandlerError::InvalidResponse(_) => RetryFamily::InvalidResponse,
            HandlerError::Unavailable(_) => RetryFamily::Unavailable,
        }
    }
}

impl From<bearmemori_store::StoreError> for HandlerError {
    fn from(e: bearmemori_store::StoreError) -> Self {
        HandlerError::InvalidResponse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HandlerError>;
