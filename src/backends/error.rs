use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend request failed: {message}")]
    RequestFailed { message: String },

    #[error("Backend '{backend}' is not available: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),
}

pub type BackendResult<T> = Result<T, BackendError>;
