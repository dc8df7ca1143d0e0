//! # Clover Core
//!
//! The matching and dispatch engine of the Clover plugin framework.
//!
//! Clover routes a textual command to every plugin handle that matches it,
//! injects the context values each handle asks for, runs the handles
//! concurrently, and hands their replies to a named sender. Plugins never see
//! the transport that delivered the command or the one that delivers the
//! reply.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Value types**: [`Event`], [`Reply`], [`Context`]
//! - **Errors**: [`RegistrationError`], [`DispatchError`], [`StartupError`]
//!
//! ### Framework Layer
//!
//! - **Handles**: match rules and their callbacks ([`Handle`], [`MatchSpec`])
//! - **Plugins**: command/pattern index and matching ([`Plugin`])
//!
//! ### Integration Layer
//!
//! - **Provider registries**: named providers and senders per channel ([`ProviderRegistry`])
//! - **Adapter**: the cross-plugin fan-out ([`Adapter`])
//!
//! ```text
//! ┌──────────┐     ┌─────────┐ match  ┌────────┐ inject ┌──────────┐ send ┌────────┐
//! │ Channel  │────▶│ Adapter │───────▶│ Plugin │───────▶│  Handle  │─────▶│ Sender │
//! └──────────┘     └─────────┘        └────────┘        └──────────┘      └────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use clover_core::prelude::*;
//!
//! let mut plugin = Plugin::new("echo");
//! plugin.on_command(["echo"], NO_KEYS, |event: Event| async move {
//!     Reply::text("text", event.args_text())
//! })?;
//!
//! let console = ProviderRegistry::new().with_sender(
//!     "text",
//!     Sender::new(NO_KEYS, |payload, _| async move {
//!         println!("{payload}");
//!         Ok::<_, BoxError>(())
//!     }),
//! );
//!
//! let adapter = Adapter::new(ProviderRegistry::new(), vec![plugin]).with_channel("console", console);
//! let delivered = adapter.dispatch("console", "echo hello", Context::new()).await?;
//! assert_eq!(delivered, 1);
//! ```

// Architectural layers
pub mod foundation;
pub mod framework;
pub mod integration;

// Re-export foundation types
pub use foundation::{
    BoxError, Context, DispatchError, DispatchResult, Event, HandleRef, IntoReply,
    RegistrationError, RegistrationResult, Reply, StartupError, Value,
};

// Re-export framework types
pub use framework::{
    BoxedCallback, EventHook, Handle, HandleFuture, HandleId, MatchSpec, Matches, NO_KEYS, Plugin,
    ReplyHook, StartupTask,
};

// Re-export integration types
pub use integration::{
    Adapter, Provider, ProviderFuture, ProviderRegistry, Sender, SenderFuture, select_inputs,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::{BoxError, Context, DispatchError, Event, Reply, Value};
    pub use super::framework::{MatchSpec, NO_KEYS, Plugin};
    pub use super::integration::{Adapter, Provider, ProviderRegistry, Sender};
}
