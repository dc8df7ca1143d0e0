//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloverConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Plugin selection.
    #[serde(default)]
    pub plugins: PluginsConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Required when `output = "file"`.
    pub file_path: Option<PathBuf>,
    /// Per-module overrides, e.g. `clover_core = "trace"`.
    pub filters: BTreeMap<String, LogLevel>,
    pub thread_ids: bool,
    pub file_location: bool,
    /// Log a line when each dispatch span closes, with its duration.
    pub span_timing: bool,
}

// =============================================================================
// Plugins
// =============================================================================

/// Which catalog plugins to load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Plugin names to load, in order. Empty loads every public plugin.
    pub enabled: Vec<String>,

    /// Directory holding per-plugin settings files (`<name>.toml`).
    pub settings_dir: Option<PathBuf>,
}

impl PluginsConfig {
    /// Path of the settings file for `plugin`, if a settings directory is configured.
    pub fn settings_path(&self, plugin: &str) -> Option<PathBuf> {
        self.settings_dir
            .as_ref()
            .map(|dir| dir.join(format!("{plugin}.toml")))
    }
}
