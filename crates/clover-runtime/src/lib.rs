//! Clover Runtime - Orchestration layer for the Clover plugin framework.
//!
//! This crate provides:
//! - Configuration loading (`ConfigLoader`, `CloverConfig`) and per-plugin settings files
//! - Logging setup from configuration (`LoggingBuilder`)
//! - A static plugin catalog (`PluginCatalog`, `PluginDescriptor`)
//! - Runtime orchestration (`CloverRuntime`)
//!
//! ```ignore
//! use clover_runtime::{CloverRuntime, PluginCatalog, PluginDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CloverRuntime::builder()
//!         .catalog(PluginCatalog::new().with(PluginDescriptor::new("echo", echo)))
//!         .channel("console", console_registry())
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use catalog::{PluginCatalog, PluginDescriptor, PluginFactory};
pub use config::{
    CloverConfig, ConfigError, ConfigLoader, ConfigResult, LogFormat, LogLevel, LogOutput,
    LoggingConfig, PluginSettings, PluginsConfig, Profile, load_config, load_config_from_file,
    validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, init_from_config};
pub use runtime::{CloverRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros and `Level` for span creation.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
