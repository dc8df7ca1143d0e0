//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The configuration sources could not be extracted into the schema.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    ValidationError { message: String },

    /// Failed to read or write a settings file.
    #[error("Settings file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A settings file is not valid TOML for its type.
    #[error("Failed to parse settings file {}: {source}", .path.display())]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Settings could not be serialized to TOML.
    #[error("Failed to serialize settings: {0}")]
    SettingsSerialize(#[from] toml::ser::Error),
}

impl ConfigError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
