//! Foundation layer: value types and the error taxonomy.

pub mod error;
pub mod event;

pub use error::{
    BoxError, DispatchError, DispatchResult, HandleRef, RegistrationError, RegistrationResult,
    StartupError,
};
pub use event::{Context, Event, IntoReply, Reply, Value};
