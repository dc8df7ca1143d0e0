//! Runtime error types.

use clover_core::{DispatchError, RegistrationError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or driving the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or validated.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A dispatch call failed.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// A plugin factory rejected one of its own handles.
    #[error("Failed to build plugin '{plugin}': {source}")]
    Registration {
        plugin: String,
        #[source]
        source: RegistrationError,
    },

    /// The configuration enables a plugin the catalog does not know.
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    /// Waiting for the shutdown signal failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
