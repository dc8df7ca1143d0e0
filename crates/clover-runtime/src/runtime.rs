//! Runtime orchestration.
//!
//! The runtime loads configuration, initializes logging, instantiates the
//! enabled plugins from a [`PluginCatalog`] and wires them into an
//! [`Adapter`] together with the channel registries supplied by the host.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use clover_runtime::CloverRuntime;
//!
//! let runtime = CloverRuntime::builder()
//!     .config_file("clover.toml")
//!     .catalog(catalog)
//!     .channel("console", console_registry)
//!     .build()?;
//!
//! runtime.start().await;
//! runtime.dispatch("console", "echo hi", Context::new()).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use clover_core::{Adapter, Context, Plugin, ProviderRegistry, StartupError};
use tokio::signal;
use tracing::{debug, info, warn};

use crate::catalog::PluginCatalog;
use crate::config::{CloverConfig, ConfigLoader, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

/// The Clover runtime: configuration plus a ready-to-dispatch adapter.
pub struct CloverRuntime {
    config: CloverConfig,
    adapter: Adapter,
    started: AtomicBool,
}

impl CloverRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &CloverConfig {
        &self.config
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Runs every plugin's startup tasks.
    ///
    /// Only the first call runs anything; failed tasks are returned and are
    /// not retried.
    pub async fn start(&self) -> Vec<StartupError> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Runtime is already started");
            return Vec::new();
        }

        info!(plugins = self.adapter.plugins().len(), "Starting Clover runtime");
        let failures = self.adapter.run_startup_tasks().await;
        if failures.is_empty() {
            info!("Runtime started");
        } else {
            warn!(failed = failures.len(), "Runtime started with failed startup tasks");
        }
        failures
    }

    /// Dispatches a command received on `channel`.
    ///
    /// Returns the number of replies delivered.
    pub async fn dispatch(
        &self,
        channel: &str,
        raw_command: &str,
        context: Context,
    ) -> RuntimeResult<usize> {
        Ok(self.adapter.dispatch(channel, raw_command, context).await?)
    }

    /// Starts the runtime and waits for `shutdown` to resolve.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await;
        shutdown.await;
        info!("Runtime stopped");
        Ok(())
    }

    /// Starts the runtime and waits for Ctrl+C.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await;
        info!("Clover runtime is now running. Press Ctrl+C to stop.");
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
        Ok(())
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`CloverRuntime`].
///
/// Configuration is loaded with a [`ConfigLoader`] rooted at the current
/// directory unless a pre-loaded [`CloverConfig`] is supplied.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<CloverConfig>,
    catalog: PluginCatalog,
    plugins: Vec<Plugin>,
    channels: Vec<(String, ProviderRegistry)>,
    default_registry: ProviderRegistry,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            catalog: PluginCatalog::new(),
            plugins: Vec::new(),
            channels: Vec::new(),
            default_registry: ProviderRegistry::new(),
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables `CLOVER_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses a pre-loaded configuration instead of the loader.
    pub fn config(mut self, config: CloverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the catalog the enabled plugins are loaded from.
    pub fn catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Adds an already-built plugin after the catalog plugins.
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Adds a channel registry.
    pub fn channel(mut self, name: impl Into<String>, registry: ProviderRegistry) -> Self {
        self.channels.push((name.into(), registry));
        self
    }

    /// Sets the fallback registry consulted after the channel's own.
    pub fn default_registry(mut self, registry: ProviderRegistry) -> Self {
        self.default_registry = registry;
        self
    }

    /// Controls whether `build` installs the global tracing subscriber.
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Loads configuration and plugins and assembles the adapter.
    pub fn build(self) -> RuntimeResult<CloverRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }
        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );

        let mut plugins = self.catalog.load_enabled(&config.plugins)?;
        plugins.extend(self.plugins);

        let mut adapter = Adapter::new(self.default_registry, plugins);
        for (name, registry) in self.channels {
            if adapter.register_channel(name.as_str(), registry).is_some() {
                warn!(channel = %name, "Channel registered twice, last registration wins");
            }
        }
        debug!(channels = ?adapter.channels().collect::<Vec<_>>(), "Adapter assembled");

        Ok(CloverRuntime {
            config,
            adapter,
            started: AtomicBool::new(false),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::catalog::PluginDescriptor;
    use crate::error::RuntimeError;
    use clover_core::{BoxError, DispatchError, Event, NO_KEYS, RegistrationResult, Reply, Sender, Value};
    use tokio::sync::{Mutex, oneshot};

    fn echo() -> RegistrationResult<Plugin> {
        let mut plugin = Plugin::new("echo");
        plugin.on_command(["echo"], NO_KEYS, |event: Event| async move {
            Reply::text("text", event.args_text())
        })?;
        Ok(plugin)
    }

    fn collector() -> (ProviderRegistry, Arc<Mutex<Vec<Value>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let registry = ProviderRegistry::new().with_sender(
            "text",
            Sender::new(NO_KEYS, move |payload, _| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().await.push(payload);
                    Ok::<_, BoxError>(())
                }
            }),
        );
        (registry, sent)
    }

    fn builder() -> RuntimeBuilder {
        CloverRuntime::builder()
            .config(CloverConfig::default())
            .init_logging(false)
            .catalog(PluginCatalog::new().with(PluginDescriptor::new("echo", echo)))
    }

    #[tokio::test]
    async fn test_dispatch_through_runtime() {
        let (registry, sent) = collector();
        let runtime = builder().channel("console", registry).build().unwrap();

        let delivered = runtime.dispatch("console", "echo hi there", Context::new()).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(*sent.lock().await, vec![Value::from("hi there")]);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_dispatch_error() {
        let runtime = builder().build().unwrap();
        let err = runtime.dispatch("irc", "echo hi", Context::new()).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Dispatch(DispatchError::UnknownChannel { .. })
        ));
    }

    #[test]
    fn test_unknown_enabled_plugin() {
        let mut config = CloverConfig::default();
        config.plugins.enabled = vec!["weather".into()];
        let err = CloverRuntime::builder()
            .config(config)
            .init_logging(false)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::UnknownPlugin(name) if name == "weather"));
    }

    #[test]
    fn test_invalid_preloaded_config() {
        let mut config = CloverConfig::default();
        config.plugins.enabled = vec!["echo".into(), "echo".into()];
        let err = builder().config(config).build().err().unwrap();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[tokio::test]
    async fn test_extra_plugin_after_catalog() {
        let runtime = builder().plugin(Plugin::new("extra")).build().unwrap();
        let names: Vec<_> = runtime.adapter().plugins().iter().map(Plugin::name).collect();
        assert_eq!(names, vec!["echo", "extra"]);
    }

    #[tokio::test]
    async fn test_start_runs_tasks_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let plugin = Plugin::new("boot");
        let counter = Arc::clone(&runs);
        plugin.startup("count", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(())
        });

        let runtime = builder().plugin(plugin).build().unwrap();
        assert!(!runtime.is_started());
        assert!(runtime.start().await.is_empty());
        assert!(runtime.start().await.is_empty());
        assert!(runtime.is_started());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let runtime = builder().build().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tx.send(()).unwrap();

        tokio::time::timeout(
            Duration::from_secs(1),
            runtime.run_until(async {
                let _ = rx.await;
            }),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(runtime.is_started());
    }
}
