//! Per-plugin settings files.
//!
//! A plugin describes its settings as a serde type with a `Default`. The first
//! run writes the defaults to disk so operators have a file to edit; later
//! runs read it back.
//!
//! Settings types opt in with an empty impl:
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize, Default)]
//! struct EchoSettings { prefix: String }
//!
//! impl PluginSettings for EchoSettings {}
//!
//! let settings = EchoSettings::load_or_init("data/echo.toml")?;
//! ```
//!
//! Types that do not opt in get none of the file helpers:
//!
//! ```compile_fail
//! use clover_runtime::PluginSettings;
//!
//! let _ = String::load_or_init("name.toml");
//! ```

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use super::error::{ConfigError, ConfigResult};

/// TOML-backed settings with defaults written on first use.
///
/// All methods have default bodies; implement the trait with an empty block.
pub trait PluginSettings: Serialize + DeserializeOwned + Default {
    /// Reads `path`, or writes and returns the defaults when it does not exist.
    fn load_or_init<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        let settings = Self::default();
        settings.save(path)?;
        info!(path = %path.display(), "Wrote default settings");
        Ok(settings)
    }

    /// Reads settings from `path`.
    fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|source| ConfigError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes settings to `path`, creating parent directories.
    fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
