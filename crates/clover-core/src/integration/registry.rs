//! Named providers and senders for one channel.
//!
//! Every provider and sender declares the context inputs it consumes when it
//! is built. At call time the registry forwards only those inputs from the
//! dispatch context and silently drops the rest, so a provider written for
//! one channel keeps working when another channel adds unrelated fields.
//!
//! ```rust,ignore
//! let registry = ProviderRegistry::new()
//!     .with_provider("user", Provider::new(["user_id"], |inputs| async move {
//!         Ok::<_, BoxError>(inputs["user_id"].clone())
//!     }))
//!     .with_sender("text", Sender::new(["reply_to"], |payload, inputs| async move {
//!         deliver(&inputs, payload).await
//!     }));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::foundation::error::BoxError;
use crate::foundation::event::{Context, Value};

/// Future returned by a provider.
pub type ProviderFuture = BoxFuture<'static, Result<Value, BoxError>>;

/// Future returned by a sender.
pub type SenderFuture = BoxFuture<'static, Result<(), BoxError>>;

type ProviderFn = Arc<dyn Fn(Context) -> ProviderFuture + Send + Sync>;
type SenderFn = Arc<dyn Fn(Value, Context) -> SenderFuture + Send + Sync>;

/// Copies the entries of `context` named in `inputs`.
///
/// Declared inputs missing from `context` are left out rather than reported.
pub fn select_inputs(inputs: &[String], context: &Context) -> Context {
    inputs
        .iter()
        .filter_map(|key| context.get(key).map(|v| (key.clone(), v.clone())))
        .collect()
}

fn collect_inputs<I, S>(inputs: I) -> Arc<[String]>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    inputs.into_iter().map(Into::into).collect()
}

// ============================================================================
// Provider
// ============================================================================

/// Resolves one context value for a handle.
#[derive(Clone)]
pub struct Provider {
    inputs: Arc<[String]>,
    func: ProviderFn,
}

impl Provider {
    /// Creates a provider consuming the named `inputs`.
    pub fn new<I, S, F, Fut, T, E>(inputs: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<Value>,
        E: Into<BoxError>,
    {
        Self {
            inputs: collect_inputs(inputs),
            func: Arc::new(move |ctx: Context| -> ProviderFuture {
                let fut = f(ctx);
                Box::pin(async move {
                    match fut.await {
                        Ok(value) => Ok::<Value, BoxError>(value.into()),
                        Err(e) => Err(e.into()),
                    }
                })
            }),
        }
    }

    /// A provider that always yields `value` and consumes nothing.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(Vec::<String>::new(), move |_| {
            let value = value.clone();
            async move { Ok::<_, BoxError>(value) }
        })
    }

    /// Creates a provider that forwards a single input unchanged.
    ///
    /// Resolves to `null` when the input is absent from the context.
    pub fn from_input(input: impl Into<String>) -> Self {
        let input = input.into();
        let key = input.clone();
        Self::new([input], move |mut ctx| {
            let value = ctx.remove(&key).unwrap_or(Value::Null);
            async move { Ok::<_, BoxError>(value) }
        })
    }

    /// Input names this provider consumes.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Invokes the provider with its declared subset of `context`.
    pub fn call(&self, context: &Context) -> ProviderFuture {
        (self.func)(select_inputs(&self.inputs, context))
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Sender
// ============================================================================

/// Delivers a reply payload.
#[derive(Clone)]
pub struct Sender {
    inputs: Arc<[String]>,
    func: SenderFn,
}

impl Sender {
    /// Creates a sender consuming the payload plus the named `inputs`.
    pub fn new<I, S, F, Fut, E>(inputs: I, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Value, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            inputs: collect_inputs(inputs),
            func: Arc::new(move |payload: Value, ctx: Context| -> SenderFuture {
                let fut = f(payload, ctx);
                Box::pin(async move { fut.await.map_err(Into::<BoxError>::into) })
            }),
        }
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Invokes the sender with `payload` and its declared subset of `context`.
    pub fn call(&self, payload: Value, context: &Context) -> SenderFuture {
        (self.func)(payload, select_inputs(&self.inputs, context))
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ProviderRegistry
// ============================================================================

/// Providers and senders of one channel, each keyed by name.
///
/// Registering under an existing name replaces the previous entry.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Provider>,
    senders: HashMap<String, Sender>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `provider` under `name`, returning the one it replaced.
    pub fn register_provider(&mut self, name: impl Into<String>, provider: Provider) -> Option<Provider> {
        let name = name.into();
        let previous = self.providers.insert(name.clone(), provider);
        if previous.is_some() {
            debug!(provider = %name, "Provider replaced");
        }
        previous
    }

    /// Installs `sender` under `name`, returning the one it replaced.
    pub fn register_sender(&mut self, name: impl Into<String>, sender: Sender) -> Option<Sender> {
        let name = name.into();
        let previous = self.senders.insert(name.clone(), sender);
        if previous.is_some() {
            debug!(sender = %name, "Sender replaced");
        }
        previous
    }

    /// Adds a provider (builder pattern).
    pub fn with_provider(mut self, name: impl Into<String>, provider: Provider) -> Self {
        self.register_provider(name, provider);
        self
    }

    /// Adds a sender (builder pattern).
    pub fn with_sender(mut self, name: impl Into<String>, sender: Sender) -> Self {
        self.register_sender(name, sender);
        self
    }

    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    pub fn sender(&self, name: &str) -> Option<&Sender> {
        self.senders.get(name)
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn sender_names(&self) -> impl Iterator<Item = &str> {
        self.senders.keys().map(String::as_str)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.provider_names().collect();
        let mut senders: Vec<&str> = self.sender_names().collect();
        providers.sort_unstable();
        senders.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("providers", &providers)
            .field("senders", &senders)
            .finish()
    }
}
