use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Routing event '{event_id}' not found")]
    EventNotFound { event_id: String },

    #[error("Routing event '{event_id}' is not finalized")]
    NotFinalized { event_id: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
