//! Event and reply value types.
//!
//! An [`Event`] is one handle's view of a matched command. It is created
//! fresh per `(plugin, handle)` match, receives its injected [`Context`]
//! exactly once during dispatch, and is dropped when the handle returns.
//!
//! A [`Reply`] is what a handle hands back: a payload tagged with the name of
//! the sender that should deliver it.

use serde::{Deserialize, Serialize};

use crate::foundation::error::BoxError;

/// Opaque value type used for context entries and reply payloads.
pub use serde_json::Value;

/// Named values, keyed by provider name or by dispatch-time input name.
pub type Context = serde_json::Map<String, Value>;

/// A matched command as seen by a single handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The full, unmodified input.
    pub raw_command: String,
    /// Tokens remaining after the matched literal prefix; empty for pattern matches.
    pub args: Vec<String>,
    /// Values injected by providers. Empty until dispatch resolves them.
    pub context: Context,
}

impl Event {
    /// Creates an event with no injected context.
    pub fn new(raw_command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            raw_command: raw_command.into(),
            args,
            context: Context::new(),
        }
    }

    /// Returns the injected value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    /// Returns the injected value for `key` as a string slice.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }

    /// Joins `args` back together with single spaces.
    pub fn args_text(&self) -> String {
        self.args.join(" ")
    }
}

/// Output of a handle, routed to the sender named by `send_method`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub send_method: String,
    pub payload: Value,
}

impl Reply {
    pub fn new(send_method: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            send_method: send_method.into(),
            payload: payload.into(),
        }
    }

    /// Shorthand for a plain text reply.
    pub fn text(send_method: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(send_method, Value::String(text.into()))
    }
}

// ============================================================================
// IntoReply - Convert handler return values
// ============================================================================

/// Types a handle callback may return.
///
/// `Ok(None)` means the handle deliberately produced nothing; that is not a
/// failure and no sender is invoked.
pub trait IntoReply: Send {
    fn into_reply(self) -> Result<Option<Reply>, BoxError>;
}

/// `()` - no output.
impl IntoReply for () {
    fn into_reply(self) -> Result<Option<Reply>, BoxError> {
        Ok(None)
    }
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Option<Reply>, BoxError> {
        Ok(Some(self))
    }
}

/// On `Some`, the inner value is converted. On `None`, there is no output.
impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Option<Reply>, BoxError> {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(None),
        }
    }
}

/// On `Err`, the error becomes the handle's failure.
impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<BoxError> + Send,
{
    fn into_reply(self) -> Result<Option<Reply>, BoxError> {
        match self {
            Ok(inner) => inner.into_reply(),
            Err(e) => Err(e.into()),
        }
    }
}
