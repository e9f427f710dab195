//! Configuration errors

use thiserror::Error;

/// Result alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file contained invalid TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed
    #[error("invalid value for {key}: {message}")]
    EnvOverride { key: String, message: String },

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
