//! Static plugin catalog.
//!
//! Plugins are compiled in and listed as [`PluginDescriptor`]s: a name and a
//! factory. The runtime instantiates the ones the configuration enables, in
//! the order it lists them.
//!
//! ```rust,ignore
//! fn echo() -> RegistrationResult<Plugin> {
//!     let mut plugin = Plugin::new("echo");
//!     plugin.on_command(["echo"], NO_KEYS, echo_handler)?;
//!     Ok(plugin)
//! }
//!
//! let catalog = PluginCatalog::new().with(PluginDescriptor::new("echo", echo));
//! ```

use clover_core::{Plugin, RegistrationResult};
use tracing::{debug, info, warn};

use crate::config::PluginsConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Factory building a live plugin.
pub type PluginFactory = fn() -> RegistrationResult<Plugin>;

/// A static, `Copy` handle to a plugin.
#[derive(Debug, Clone, Copy)]
pub struct PluginDescriptor {
    /// Lookup key in configuration. Names starting with `_` are private.
    pub name: &'static str,
    pub create: PluginFactory,
}

impl PluginDescriptor {
    pub const fn new(name: &'static str, create: PluginFactory) -> Self {
        Self { name, create }
    }

    /// Private plugins are only loaded when named explicitly.
    pub fn is_private(&self) -> bool {
        self.name.starts_with('_')
    }

    /// Builds the live plugin.
    pub fn instantiate(&self) -> RuntimeResult<Plugin> {
        let plugin = (self.create)().map_err(|source| RuntimeError::Registration {
            plugin: self.name.to_string(),
            source,
        })?;
        debug!(plugin = self.name, handles = plugin.handle_count(), "Plugin instantiated");
        Ok(plugin)
    }
}

/// Ordered set of known plugins, unique by name.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    descriptors: Vec<PluginDescriptor>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor; a descriptor with the same name is replaced in place.
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        match self
            .descriptors
            .iter_mut()
            .find(|d| d.name == descriptor.name)
        {
            Some(existing) => {
                warn!(plugin = descriptor.name, "Duplicate plugin descriptor, last registration wins");
                *existing = descriptor;
            }
            None => self.descriptors.push(descriptor),
        }
    }

    /// Adds a descriptor (builder pattern).
    pub fn with(mut self, descriptor: PluginDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().map(|d| d.name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Instantiates the named plugins in the given order.
    pub fn load<I, S>(&self, names: I) -> RuntimeResult<Vec<Plugin>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                self.get(name)
                    .ok_or_else(|| RuntimeError::UnknownPlugin(name.to_string()))?
                    .instantiate()
            })
            .collect()
    }

    /// Instantiates every public plugin in registration order.
    pub fn load_all(&self) -> RuntimeResult<Vec<Plugin>> {
        self.descriptors
            .iter()
            .filter(|d| !d.is_private())
            .map(PluginDescriptor::instantiate)
            .collect()
    }

    /// Instantiates what `config` enables: the listed names, or every public plugin.
    pub fn load_enabled(&self, config: &PluginsConfig) -> RuntimeResult<Vec<Plugin>> {
        let plugins = if config.enabled.is_empty() {
            self.load_all()?
        } else {
            self.load(&config.enabled)?
        };
        info!(
            plugins = ?plugins.iter().map(Plugin::name).collect::<Vec<_>>(),
            "Plugins loaded"
        );
        Ok(plugins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clover_core::{Event, NO_KEYS, RegistrationError};

    fn echo() -> RegistrationResult<Plugin> {
        let mut plugin = Plugin::new("echo");
        plugin.on_command(["echo"], NO_KEYS, |_e: Event| async {})?;
        Ok(plugin)
    }

    fn ping() -> RegistrationResult<Plugin> {
        let mut plugin = Plugin::new("ping");
        plugin.on_regex("^ping", NO_KEYS, |_e: Event| async {})?;
        Ok(plugin)
    }

    fn hidden() -> RegistrationResult<Plugin> {
        Ok(Plugin::new("_hidden"))
    }

    fn broken() -> RegistrationResult<Plugin> {
        let mut plugin = Plugin::new("broken");
        plugin.on_regex("([", NO_KEYS, |_e: Event| async {})?;
        Ok(plugin)
    }

    fn catalog() -> PluginCatalog {
        PluginCatalog::new()
            .with(PluginDescriptor::new("echo", echo))
            .with(PluginDescriptor::new("_hidden", hidden))
            .with(PluginDescriptor::new("ping", ping))
    }

    fn names(plugins: &[Plugin]) -> Vec<&str> {
        plugins.iter().map(Plugin::name).collect()
    }

    #[test]
    fn test_load_all_skips_private() {
        let plugins = catalog().load_all().unwrap();
        assert_eq!(names(&plugins), vec!["echo", "ping"]);
    }

    #[test]
    fn test_load_in_listed_order() {
        let plugins = catalog().load(["ping", "_hidden", "echo"]).unwrap();
        assert_eq!(names(&plugins), vec!["ping", "_hidden", "echo"]);
    }

    #[test]
    fn test_unknown_plugin() {
        let err = catalog().load(["echo", "weather"]).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownPlugin(name) if name == "weather"));
    }

    #[test]
    fn test_load_enabled() {
        let mut config = PluginsConfig::default();
        assert_eq!(catalog().load_enabled(&config).unwrap().len(), 2);
        config.enabled = vec!["ping".into()];
        assert_eq!(names(&catalog().load_enabled(&config).unwrap()), vec!["ping"]);
    }

    #[test]
    fn test_duplicate_replaces_in_place() {
        let catalog = catalog().with(PluginDescriptor::new("echo", ping));
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["echo", "_hidden", "ping"]);
        // The replacement factory builds the "ping" plugin.
        assert_eq!(catalog.load(["echo"]).unwrap()[0].name(), "ping");
    }

    #[test]
    fn test_registration_failure_names_plugin() {
        let catalog = PluginCatalog::new().with(PluginDescriptor::new("broken", broken));
        match catalog.load_all().unwrap_err() {
            RuntimeError::Registration { plugin, source } => {
                assert_eq!(plugin, "broken");
                assert!(matches!(source, RegistrationError::InvalidPattern { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
