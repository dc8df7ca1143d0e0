//! Cross-plugin dispatch.
//!
//! The [`Adapter`] owns one [`ProviderRegistry`] per channel, a default
//! registry used as fallback, and an immutable snapshot of the loaded
//! plugins. For each incoming command it runs the pipeline
//!
//! ```text
//! match ──▶ inject ──▶ invoke ──▶ send
//! ```
//!
//! once per matched handle. All matched handles of all plugins run
//! concurrently; the steps within one handle run in order.
//!
//! # Name resolution
//!
//! Providers and senders are looked up in the channel's registry first and
//! in the default registry only when the channel lacks the name.
//!
//! # Failure
//!
//! The first failing handle aborts the call. Sibling handles still in flight
//! are dropped; replies already delivered stay delivered.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tracing::{Instrument, Level, debug, error, info, span, trace};

use crate::foundation::error::{DispatchError, DispatchResult, HandleRef, StartupError};
use crate::foundation::event::{Context, Event};
use crate::framework::handle::HandleId;
use crate::framework::plugin::Plugin;
use crate::integration::registry::{Provider, ProviderRegistry, Sender};

/// Routes commands from any channel to every matching plugin handle.
#[derive(Clone)]
pub struct Adapter {
    channels: HashMap<String, Arc<ProviderRegistry>>,
    default_registry: Arc<ProviderRegistry>,
    plugins: Arc<[Plugin]>,
}

impl Adapter {
    /// Creates an adapter over a fixed list of plugins.
    ///
    /// Reloading plugins means building a new adapter.
    pub fn new(default_registry: ProviderRegistry, plugins: Vec<Plugin>) -> Self {
        for plugin in &plugins {
            info!(plugin = %plugin.name(), handles = plugin.handle_count(), "Plugin registered");
        }
        Self {
            channels: HashMap::new(),
            default_registry: Arc::new(default_registry),
            plugins: plugins.into(),
        }
    }

    /// Adds a channel registry (builder pattern).
    pub fn with_channel(mut self, channel: impl Into<String>, registry: ProviderRegistry) -> Self {
        self.register_channel(channel, registry);
        self
    }

    /// Installs the registry for `channel`, returning the one it replaced.
    pub fn register_channel(
        &mut self,
        channel: impl Into<String>,
        registry: ProviderRegistry,
    ) -> Option<Arc<ProviderRegistry>> {
        let channel = channel.into();
        debug!(channel = %channel, registry = ?registry, "Channel registered");
        self.channels.insert(channel, Arc::new(registry))
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn default_registry(&self) -> &ProviderRegistry {
        &self.default_registry
    }

    fn provider<'a>(&'a self, registry: &'a ProviderRegistry, name: &str) -> Option<&'a Provider> {
        registry
            .provider(name)
            .or_else(|| self.default_registry.provider(name))
    }

    fn sender<'a>(&'a self, registry: &'a ProviderRegistry, name: &str) -> Option<&'a Sender> {
        registry
            .sender(name)
            .or_else(|| self.default_registry.sender(name))
    }

    // ─── Dispatch ────────────────────────────────────────────────────────────

    /// Dispatches `raw_command` received on `channel`.
    ///
    /// `context` holds the channel-specific inputs that providers and senders
    /// draw from. Returns how many handles produced a reply that was
    /// delivered.
    pub async fn dispatch(
        &self,
        channel: &str,
        raw_command: &str,
        context: Context,
    ) -> DispatchResult<usize> {
        let registry = self
            .channels
            .get(channel)
            .ok_or_else(|| DispatchError::UnknownChannel {
                channel: channel.to_string(),
            })?;

        let span = span!(Level::DEBUG, "dispatch", channel = %channel, command = %raw_command);
        self.dispatch_matched(registry, raw_command, &context)
            .instrument(span)
            .await
    }

    async fn dispatch_matched(
        &self,
        registry: &ProviderRegistry,
        raw_command: &str,
        context: &Context,
    ) -> DispatchResult<usize> {
        let tasks: Vec<_> = self
            .plugins
            .iter()
            .flat_map(|plugin| {
                plugin
                    .matches(raw_command)
                    .into_iter()
                    .map(move |(id, event)| (plugin, id, event))
            })
            .map(|(plugin, id, event)| self.run_handle(registry, plugin, id, event, context))
            .collect();

        if tasks.is_empty() {
            trace!("No handle matched");
            return Ok(0);
        }

        let matched = tasks.len();
        let delivered: usize = try_join_all(tasks).await?.into_iter().sum();
        debug!(matched, delivered, "Dispatch finished");
        Ok(delivered)
    }

    /// Runs inject, invoke and send for one matched handle.
    async fn run_handle(
        &self,
        registry: &ProviderRegistry,
        plugin: &Plugin,
        id: HandleId,
        mut event: Event,
        context: &Context,
    ) -> DispatchResult<usize> {
        let handle_ref = HandleRef::new(plugin.name(), id);

        // Resolve every provider before calling any of them.
        let required = plugin
            .handle(id)
            .map(|h| h.required_keys().iter().collect::<Vec<_>>())
            .unwrap_or_default();
        let providers = required
            .into_iter()
            .map(|name| {
                self.provider(registry, name)
                    .map(|provider| (name, provider))
                    .ok_or_else(|| DispatchError::MissingProvider {
                        name: name.clone(),
                        handle: handle_ref.clone(),
                    })
            })
            .collect::<DispatchResult<Vec<_>>>()?;

        let values = try_join_all(providers.into_iter().map(|(name, provider)| {
            let handle_ref = &handle_ref;
            async move {
                provider
                    .call(context)
                    .await
                    .map(|value| (name.clone(), value))
                    .map_err(|source| DispatchError::Provider {
                        name: name.clone(),
                        handle: handle_ref.clone(),
                        source,
                    })
            }
        }))
        .await?;
        event.context.extend(values);

        trace!(handle = %handle_ref, "Invoking handle");
        let reply = plugin
            .call(id, event)
            .await
            .map_err(|source| DispatchError::Handler {
                handle: handle_ref.clone(),
                source,
            })?;

        let Some(reply) = reply else {
            trace!(handle = %handle_ref, "Handle produced no reply");
            return Ok(0);
        };

        let sender = self
            .sender(registry, &reply.send_method)
            .ok_or_else(|| DispatchError::MissingSender {
                method: reply.send_method.clone(),
                handle: handle_ref.clone(),
            })?;

        sender
            .call(reply.payload, context)
            .await
            .map_err(|source| DispatchError::Sender {
                method: reply.send_method,
                handle: handle_ref.clone(),
                source,
            })?;

        trace!(handle = %handle_ref, "Reply delivered");
        Ok(1)
    }

    // ─── Startup ─────────────────────────────────────────────────────────────

    /// Runs every plugin's pending startup tasks concurrently.
    ///
    /// Each task runs at most once across all calls. Failures are logged and
    /// returned; they never stop sibling tasks.
    pub async fn run_startup_tasks(&self) -> Vec<StartupError> {
        let tasks: Vec<_> = self
            .plugins
            .iter()
            .flat_map(|plugin| {
                plugin
                    .take_startup_tasks()
                    .into_iter()
                    .map(move |task| (plugin.name(), task))
            })
            .collect();

        if tasks.is_empty() {
            return Vec::new();
        }

        let results = join_all(tasks.into_iter().map(|(plugin, task)| async move {
            let name = task.name().to_string();
            match task.run().await {
                Ok(()) => {
                    info!(plugin = %plugin, task = %name, "Startup task finished");
                    None
                }
                Err(source) => {
                    error!(plugin = %plugin, task = %name, error = %source, "Startup task failed");
                    Some(StartupError {
                        plugin: plugin.to_string(),
                        task: name,
                        source,
                    })
                }
            }
        }))
        .await;

        results.into_iter().flatten().collect()
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("plugin_count", &self.plugins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::BoxError;
    use crate::foundation::event::{Reply, Value};
    use crate::framework::plugin::NO_KEYS;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    type Outbox = Arc<Mutex<Vec<(Value, Context)>>>;

    fn recording_sender(outbox: &Outbox, inputs: &[&str]) -> Sender {
        let outbox = Arc::clone(outbox);
        let inputs: Vec<String> = inputs.iter().map(|s| s.to_string()).collect();
        Sender::new(inputs, move |payload, ctx| {
            let outbox = Arc::clone(&outbox);
            async move {
                outbox.lock().unwrap().push((payload, ctx));
                Ok::<_, BoxError>(())
            }
        })
    }

    fn echo_plugin() -> Plugin {
        let mut plugin = Plugin::new("echo");
        plugin
            .on_command(["echo"], NO_KEYS, |event: Event| async move {
                Reply::text("text", event.args_text())
            })
            .unwrap();
        plugin
    }

    fn context(pairs: &[(&str, Value)]) -> Context {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let adapter = Adapter::new(ProviderRegistry::new(), vec![echo_plugin()]);
        let err = adapter.dispatch("irc", "echo hi", Context::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownChannel { channel } if channel == "irc"));
    }

    #[tokio::test]
    async fn test_no_match_returns_zero() {
        let adapter = Adapter::new(ProviderRegistry::new(), vec![echo_plugin()])
            .with_channel("console", ProviderRegistry::new());
        assert_eq!(adapter.dispatch("console", "unknown", Context::new()).await.unwrap(), 0);
        assert_eq!(adapter.dispatch("console", "", Context::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_echo_reply_is_delivered() {
        let outbox = Outbox::default();
        let adapter = Adapter::new(ProviderRegistry::new(), vec![echo_plugin()]).with_channel(
            "console",
            ProviderRegistry::new().with_sender("text", recording_sender(&outbox, &[])),
        );

        let count = adapter.dispatch("console", "echohi there", Context::new()).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(outbox.lock().unwrap()[0].0, json!("hi there"));
    }

    #[tokio::test]
    async fn test_default_registry_fallback() {
        let mut plugin = Plugin::new("whoami");
        plugin
            .on_command(["whoami"], ["user"], |event: Event| async move {
                Reply::new("text", event.get("user").cloned().unwrap_or_default())
            })
            .unwrap();

        let outbox = Outbox::default();
        let default = ProviderRegistry::new()
            .with_provider("user", Provider::from_input("user_id"))
            .with_sender("text", recording_sender(&outbox, &[]));
        let adapter = Adapter::new(default, vec![plugin]).with_channel("qq", ProviderRegistry::new());

        let count = adapter
            .dispatch("qq", "whoami", context(&[("user_id", json!("u1"))]))
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(outbox.lock().unwrap()[0].0, json!("u1"));
    }

    #[tokio::test]
    async fn test_channel_registry_wins_over_default() {
        let mut plugin = Plugin::new("who");
        plugin
            .on_command(["who"], ["user"], |event: Event| async move {
                Reply::new("text", event.get("user").cloned().unwrap_or_default())
            })
            .unwrap();

        let default_out = Outbox::default();
        let channel_out = Outbox::default();
        let default = ProviderRegistry::new()
            .with_provider("user", Provider::constant("default"))
            .with_sender("text", recording_sender(&default_out, &[]));
        let channel = ProviderRegistry::new()
            .with_provider("user", Provider::constant("channel"))
            .with_sender("text", recording_sender(&channel_out, &[]));
        let adapter = Adapter::new(default, vec![plugin]).with_channel("tg", channel);

        adapter.dispatch("tg", "who", Context::new()).await.unwrap();
        assert!(default_out.lock().unwrap().is_empty());
        assert_eq!(channel_out.lock().unwrap()[0].0, json!("channel"));
    }

    #[tokio::test]
    async fn test_injection_is_total() {
        let mut plugin = Plugin::new("keys");
        plugin
            .on_command(["keys"], ["a", "b", "c"], |event: Event| async move {
                let keys: Vec<String> = event.context.keys().cloned().collect();
                Reply::new("text", json!(keys))
            })
            .unwrap();

        let outbox = Outbox::default();
        let default = ProviderRegistry::new()
            .with_provider("a", Provider::constant(1))
            .with_provider("c", Provider::constant(3));
        let channel = ProviderRegistry::new()
            .with_provider("b", Provider::constant(2))
            .with_sender("text", recording_sender(&outbox, &[]));
        let adapter = Adapter::new(default, vec![plugin]).with_channel("c", channel);

        adapter.dispatch("c", "keys", Context::new()).await.unwrap();
        assert_eq!(outbox.lock().unwrap()[0].0, json!(["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_missing_provider_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut plugin = Plugin::new("needs");
        plugin
            .on_command(["needs"], ["group"], move |_event: Event| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {}
            })
            .unwrap();
        let adapter = Adapter::new(ProviderRegistry::new(), vec![plugin])
            .with_channel("c", ProviderRegistry::new());

        let err = adapter.dispatch("c", "needs", Context::new()).await.unwrap_err();
        match err {
            DispatchError::MissingProvider { name, handle } => {
                assert_eq!(name, "group");
                assert_eq!(handle, HandleRef::new("needs", 0));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_sender() {
        let adapter = Adapter::new(ProviderRegistry::new(), vec![echo_plugin()])
            .with_channel("c", ProviderRegistry::new());
        let err = adapter.dispatch("c", "echo x", Context::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingSender { ref method, .. } if method == "text"));
        assert_eq!(err.handle(), Some(&HandleRef::new("echo", 0)));
    }

    #[tokio::test]
    async fn test_handler_without_reply_counts_zero() {
        let mut plugin = Plugin::new("quiet");
        plugin.on_regex("^log", NO_KEYS, |_event: Event| async {}).unwrap();
        let adapter = Adapter::new(ProviderRegistry::new(), vec![plugin])
            .with_channel("c", ProviderRegistry::new());
        assert_eq!(adapter.dispatch("c", "log this", Context::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_plugins_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let plugins: Vec<Plugin> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let barrier = Arc::clone(&barrier);
                let mut plugin = Plugin::new(name);
                plugin
                    .on_command(["stat"], NO_KEYS, move |_event: Event| {
                        let barrier = Arc::clone(&barrier);
                        async move {
                            // Only returns once both handles are in flight.
                            barrier.wait().await;
                            Reply::text("text", "ok")
                        }
                    })
                    .unwrap();
                plugin
            })
            .collect();

        let outbox = Outbox::default();
        let adapter = Adapter::new(
            ProviderRegistry::new().with_sender("text", recording_sender(&outbox, &[])),
            plugins,
        )
        .with_channel("c", ProviderRegistry::new());

        let count = tokio::time::timeout(
            Duration::from_secs(5),
            adapter.dispatch("c", "stat", Context::new()),
        )
        .await
        .expect("handles did not run concurrently")
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(outbox.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_providers_of_one_handle_run_concurrently() {
        let mut plugin = Plugin::new("pair");
        plugin
            .on_command(["pair"], ["a", "b"], |event: Event| async move {
                Reply::new("text", json!([event.get("a"), event.get("b")]))
            })
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let waiting = |value: &'static str| {
            let barrier = Arc::clone(&barrier);
            Provider::new(Vec::<String>::new(), move |_| {
                let barrier = Arc::clone(&barrier);
                async move {
                    // Resolves only while the sibling provider is also pending.
                    barrier.wait().await;
                    Ok::<_, BoxError>(value)
                }
            })
        };

        let outbox = Outbox::default();
        let registry = ProviderRegistry::new()
            .with_provider("a", waiting("left"))
            .with_provider("b", waiting("right"))
            .with_sender("text", recording_sender(&outbox, &[]));
        let adapter = Adapter::new(ProviderRegistry::new(), vec![plugin]).with_channel("c", registry);

        let count = tokio::time::timeout(
            Duration::from_secs(3),
            adapter.dispatch("c", "pair", Context::new()),
        )
        .await
        .expect("providers did not run concurrently")
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(outbox.lock().unwrap()[0].0, json!(["left", "right"]));
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let mut plugin = Plugin::new("boom");
        plugin
            .on_command(["boom"], NO_KEYS, |_event: Event| async {
                Err::<Reply, _>("exploded")
            })
            .unwrap();
        let adapter = Adapter::new(ProviderRegistry::new(), vec![plugin])
            .with_channel("c", ProviderRegistry::new());

        let err = adapter.dispatch("c", "boom", Context::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler { .. }));
        assert_eq!(err.to_string(), "handle boom#0 failed: exploded");
    }

    #[tokio::test]
    async fn test_provider_and_sender_errors_carry_handle() {
        let mut plugin = Plugin::new("p");
        plugin
            .on_command(["x"], ["flaky"], |_event: Event| async { Reply::text("text", "") })
            .unwrap();
        plugin
            .on_command(["y"], NO_KEYS, |_event: Event| async { Reply::text("broken", "") })
            .unwrap();

        let registry = ProviderRegistry::new()
            .with_provider(
                "flaky",
                Provider::new(Vec::<String>::new(), |_| async { Err::<Value, _>("timeout") }),
            )
            .with_sender(
                "broken",
                Sender::new(Vec::<String>::new(), |_, _| async { Err::<(), _>("closed") }),
            );
        let adapter = Adapter::new(ProviderRegistry::new(), vec![plugin]).with_channel("c", registry);

        let err = adapter.dispatch("c", "x", Context::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Provider { ref name, .. } if name == "flaky"));
        assert_eq!(err.handle(), Some(&HandleRef::new("p", 0)));

        let err = adapter.dispatch("c", "y", Context::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Sender { ref method, .. } if method == "broken"));
        assert_eq!(err.handle(), Some(&HandleRef::new("p", 1)));
    }

    #[tokio::test]
    async fn test_sender_gets_filtered_context() {
        let outbox = Outbox::default();
        let adapter = Adapter::new(ProviderRegistry::new(), vec![echo_plugin()]).with_channel(
            "c",
            ProviderRegistry::new().with_sender("text", recording_sender(&outbox, &["room"])),
        );

        let ctx = context(&[("room", json!("#rust")), ("token", json!("secret"))]);
        adapter.dispatch("c", "echo hi", ctx).await.unwrap();

        let sent = outbox.lock().unwrap();
        assert_eq!(sent[0].1.len(), 1);
        assert_eq!(sent[0].1["room"], json!("#rust"));
    }

    #[tokio::test]
    async fn test_startup_tasks_run_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let plugins: Vec<Plugin> = (0..3)
            .map(|i| {
                let plugin = Plugin::new(format!("p{i}"));
                let runs = Arc::clone(&runs);
                plugin.startup("init", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                });
                plugin
            })
            .collect();
        let adapter = Adapter::new(ProviderRegistry::new(), plugins);

        assert!(adapter.run_startup_tasks().await.is_empty());
        assert!(adapter.run_startup_tasks().await.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_overlapping_startup_calls_run_each_task_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let plugins: Vec<Plugin> = (0..4)
            .map(|i| {
                let plugin = Plugin::new(format!("p{i}"));
                let runs = Arc::clone(&runs);
                plugin.startup("init", move || async move {
                    tokio::task::yield_now().await;
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                });
                plugin
            })
            .collect();
        let adapter = Adapter::new(ProviderRegistry::new(), plugins);

        let (first, second) = tokio::join!(adapter.run_startup_tasks(), adapter.run_startup_tasks());
        assert!(first.is_empty() && second.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert!(adapter.plugins().iter().all(|p| p.pending_startup_tasks() == 0));
    }

    #[tokio::test]
    async fn test_startup_failure_does_not_stop_siblings() {
        let runs = Arc::new(AtomicUsize::new(0));
        let plugin = Plugin::new("boot");
        plugin.startup("bad", || async { Err::<(), _>("db unreachable") });
        let counter = Arc::clone(&runs);
        plugin.startup("good", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(())
        });
        let adapter = Adapter::new(ProviderRegistry::new(), vec![plugin]);

        let errors = adapter.run_startup_tasks().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].task, "bad");
        assert_eq!(errors[0].plugin, "boot");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.plugins()[0].pending_startup_tasks(), 0);
    }
}
