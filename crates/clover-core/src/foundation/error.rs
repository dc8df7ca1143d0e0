//! Unified error types for the Clover core.
//!
//! Registration failures are raised synchronously while a plugin is being
//! built. Dispatch failures abort the whole `dispatch` call and always name
//! the handle responsible, except for [`DispatchError::UnknownChannel`] which
//! happens before any handle is considered.

use std::fmt;

use thiserror::Error;

use crate::framework::handle::HandleId;

/// Error type produced by user callbacks (handles, providers, senders, startup tasks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Identifies a handle across plugins: handle ids are only unique per plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleRef {
    pub plugin: String,
    pub handle: HandleId,
}

impl HandleRef {
    pub fn new(plugin: impl Into<String>, handle: HandleId) -> Self {
        Self {
            plugin: plugin.into(),
            handle,
        }
    }
}

impl fmt::Display for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.plugin, self.handle)
    }
}

// =============================================================================
// Registration Errors
// =============================================================================

/// Errors raised while registering a handle on a plugin.
///
/// A failed registration leaves the plugin untouched.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The textual pattern is not a valid regular expression.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A literal command set with no entries.
    #[error("command set is empty")]
    EmptyCommands,

    /// A literal command that can never equal a whitespace-split token.
    #[error("command '{command}' contains whitespace")]
    InvalidCommand { command: String },
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors that abort a dispatch call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No provider registry is registered for the channel.
    #[error("unknown channel '{channel}'")]
    UnknownChannel { channel: String },

    /// Neither the channel nor the default registry provides `name`.
    #[error("no provider for '{name}' required by handle {handle}")]
    MissingProvider { name: String, handle: HandleRef },

    /// Neither the channel nor the default registry has a sender `method`.
    #[error("no sender '{method}' for reply of handle {handle}")]
    MissingSender { method: String, handle: HandleRef },

    /// A provider failed while resolving a context value.
    #[error("provider '{name}' failed for handle {handle}: {source}")]
    Provider {
        name: String,
        handle: HandleRef,
        #[source]
        source: BoxError,
    },

    /// The handle callback itself failed.
    #[error("handle {handle} failed: {source}")]
    Handler {
        handle: HandleRef,
        #[source]
        source: BoxError,
    },

    /// A sender failed while delivering a reply.
    #[error("sender '{method}' failed for handle {handle}: {source}")]
    Sender {
        method: String,
        handle: HandleRef,
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    /// The handle responsible for this failure, if one was involved.
    pub fn handle(&self) -> Option<&HandleRef> {
        match self {
            Self::UnknownChannel { .. } => None,
            Self::MissingProvider { handle, .. }
            | Self::MissingSender { handle, .. }
            | Self::Provider { handle, .. }
            | Self::Handler { handle, .. }
            | Self::Sender { handle, .. } => Some(handle),
        }
    }
}

// =============================================================================
// Startup Errors
// =============================================================================

/// A startup task that failed. Sibling tasks are unaffected.
#[derive(Debug, Error)]
#[error("startup task '{task}' of plugin '{plugin}' failed: {source}")]
pub struct StartupError {
    pub plugin: String,
    pub task: String,
    #[source]
    pub source: BoxError,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for handle registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Result type for dispatch.
pub type DispatchResult<T> = Result<T, DispatchError>;
