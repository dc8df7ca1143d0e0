//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{CloverConfig, LogOutput, LoggingConfig, PluginsConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CloverConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_plugins(&config.plugins)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.output = \"file\" requires logging.file_path",
        ));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter module name: {module:?}"
        )));
    }

    Ok(())
}

fn validate_plugins(plugins: &PluginsConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in &plugins.enabled {
        if name.trim().is_empty() {
            return Err(ConfigError::validation("Plugin names must not be empty"));
        }
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::validation(format!(
                "Plugin '{name}' is enabled more than once"
            )));
        }
    }
    Ok(())
}
