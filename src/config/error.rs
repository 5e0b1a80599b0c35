use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid router config: {0}")]
    InvalidConfig(String),

    #[error("Layer '{layer}' not found in configuration")]
    LayerNotFound { layer: String },

    #[error("Config store has no backing file")]
    NoBackingFile,

    #[error("Failed to get config directory")]
    NoConfigDirectory,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializationError(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
