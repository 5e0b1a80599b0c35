use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Task description must not be empty")]
    EmptyDescription,

    #[error("No adapter registered for configured layer '{layer}'")]
    AdapterMissing { layer: String },

    #[error("Config error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

pub type RoutingResult<T> = Result<T, RoutingError>;
