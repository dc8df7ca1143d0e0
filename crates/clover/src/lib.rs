//! # Clover
//!
//! A small, transport-agnostic command router for plugin-based bots.
//!
//! ## Overview
//!
//! Plugins declare handles that match a command either by literal prefix or
//! by regular expression. Each handle names the context values it needs;
//! named providers compute those values per channel. An adapter runs every
//! matching handle concurrently and delivers each reply through a named
//! sender, looking first in the channel's registry and then in the default
//! one.
//!
//! ```text
//! ┌─────────────┐     ┌─────────┐────▶ Plugin "echo"  ──▶ handle ──▶ sender "text"
//! │   Channel   │────▶│ Adapter │────▶ Plugin "ping"  ──▶ handle ──▶ sender "text"
//! └─────────────┘     └─────────┘────▶ Plugin ...      ──▶ handle ──▶ sender ...
//! ```
//!
//! - **Runtime**: Loads configuration, logging and the enabled plugins
//! - **Adapter**: Fans a command out to matching handles
//! - **Plugins**: Own their handles, hooks and startup tasks
//! - **Registries**: Named providers and senders per channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clover::prelude::*;
//!
//! fn echo() -> RegistrationResult<Plugin> {
//!     let mut plugin = Plugin::new("echo");
//!     plugin.on_command(["echo"], NO_KEYS, |event: Event| async move {
//!         Reply::text("text", event.args_text())
//!     })?;
//!     Ok(plugin)
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CloverRuntime::builder()
//!         .catalog(PluginCatalog::new().with(PluginDescriptor::new("echo", echo)))
//!         .channel("console", console_registry())
//!         .build()?;
//!
//!     runtime.start().await;
//!     runtime.dispatch("console", "echo hello", Context::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use clover_core as core;
pub use clover_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use clover::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use clover_runtime::{
        CloverConfig, CloverRuntime, PluginCatalog, PluginDescriptor, PluginSettings,
        RuntimeError, RuntimeResult,
    };

    // Plugins and handles
    pub use clover_core::{
        Event, IntoReply, MatchSpec, NO_KEYS, Plugin, RegistrationError, RegistrationResult,
        Reply,
    };

    // Channel integration
    pub use clover_core::{
        Adapter, BoxError, Context, DispatchError, Provider, ProviderRegistry, Sender, Value,
    };
}
