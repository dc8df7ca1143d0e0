//! Configuration module for the Clover runtime.
//!
//! Provides figment-based loading from files and environment variables,
//! validation, and TOML-backed per-plugin settings files.

pub mod error;
pub mod loader;
pub mod schema;
pub mod settings;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{CloverConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, PluginsConfig};
pub use settings::PluginSettings;
pub use validation::validate_config;
