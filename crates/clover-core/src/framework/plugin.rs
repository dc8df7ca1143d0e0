//! Plugins: named collections of handles with a command index.
//!
//! # Matching
//!
//! [`Plugin::matches`] runs two independent passes and merges them by handle
//! id. A handle is indexed under exactly one of the two, so the passes never
//! compete for the same id.
//!
//! - **Literal pass.** The input is split on whitespace, which here also
//!   covers the ASCII information separators U+001C..=U+001F. Every registered
//!   command that is a string prefix of the first token matches. An exact
//!   match yields the remaining tokens as `args`; a partial match re-inserts
//!   the unmatched suffix as the first argument, so `"echohi"` matches
//!   `"echo"` with `args == ["hi"]`.
//! - **Pattern pass.** Every regular expression that matches at the start of
//!   the raw input (not necessarily consuming all of it) matches with empty
//!   `args`.
//!
//! ```rust,ignore
//! let mut plugin = Plugin::new("echo");
//! plugin.on_command(["echo"], NO_KEYS, |event: Event| async move {
//!     Reply::text("text", event.args_text())
//! })?;
//!
//! let matches = plugin.matches("echohi");
//! assert_eq!(matches[&0].args, vec!["hi"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, trace};

use crate::foundation::error::{BoxError, RegistrationResult};
use crate::foundation::event::{Event, IntoReply, Reply};
use crate::framework::handle::{Handle, HandleId, MatchSpec, boxed_callback, split_tokens};

/// Handle ids mapped to the event each one should receive.
pub type Matches = BTreeMap<HandleId, Event>;

/// Transforms an event before any handle of the plugin sees it.
pub type EventHook = Arc<dyn Fn(Event) -> Event + Send + Sync>;

/// Transforms a reply produced by any handle of the plugin; `None` drops it.
pub type ReplyHook = Arc<dyn Fn(Reply) -> Option<Reply> + Send + Sync>;

/// Convenience for handles that need no injected context.
pub const NO_KEYS: [&str; 0] = [];

// ─── StartupTask ──────────────────────────────────────────────────────────────

type StartupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// A deferred operation run once when the process starts serving.
pub struct StartupTask {
    name: String,
    run: StartupFn,
}

impl StartupTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consumes the task and runs it.
    pub async fn run(self) -> Result<(), BoxError> {
        (self.run)().await
    }
}

impl fmt::Debug for StartupTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

struct PatternEntry {
    regex: Regex,
    handles: BTreeSet<HandleId>,
}

/// A named collection of handles plus the indexes used to match them.
///
/// Indexes are only written during registration, which takes `&mut self`;
/// once a plugin is handed to an [`Adapter`](crate::Adapter) it is read-only
/// apart from its pending startup tasks.
pub struct Plugin {
    name: String,
    /// Indexed by [`HandleId`].
    handles: Vec<Handle>,
    commands: BTreeMap<String, BTreeSet<HandleId>>,
    /// Keyed by pattern source; the same source registered twice shares an entry.
    patterns: BTreeMap<String, PatternEntry>,
    startup: Mutex<Vec<StartupTask>>,
    event_hook: Option<EventHook>,
    reply_hook: Option<ReplyHook>,
}

impl Plugin {
    /// Creates an empty plugin.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handles: Vec::new(),
            commands: BTreeMap::new(),
            patterns: BTreeMap::new(),
            startup: Mutex::new(Vec::new()),
            event_hook: None,
            reply_hook: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets a hook applied to every event before its handle runs.
    pub fn with_event_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Event) -> Event + Send + Sync + 'static,
    {
        self.event_hook = Some(Arc::new(hook));
        self
    }

    /// Sets a hook applied to every reply a handle produces.
    ///
    /// The hook may return a `Reply` or an `Option<Reply>`; `None` means
    /// there is nothing to send.
    pub fn with_reply_hook<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(Reply) -> R + Send + Sync + 'static,
        R: Into<Option<Reply>>,
    {
        self.reply_hook = Some(Arc::new(move |reply: Reply| -> Option<Reply> {
            hook(reply).into()
        }));
        self
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers a handle and returns its id.
    ///
    /// Ids are assigned in registration order starting at 0. A rejected
    /// registration consumes no id and leaves the indexes untouched.
    pub fn register<K, S, F, Fut, R>(
        &mut self,
        match_spec: MatchSpec,
        required_keys: K,
        callback: F,
    ) -> RegistrationResult<HandleId>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        match_spec.validate()?;

        let id = self.handles.len();
        match &match_spec {
            MatchSpec::Commands(commands) => {
                for command in commands {
                    self.commands.entry(command.clone()).or_default().insert(id);
                }
            }
            MatchSpec::Pattern(regex) => {
                self.patterns
                    .entry(regex.as_str().to_string())
                    .or_insert_with(|| PatternEntry {
                        regex: regex.clone(),
                        handles: BTreeSet::new(),
                    })
                    .handles
                    .insert(id);
            }
        }

        debug!(plugin = %self.name, handle = id, spec = %match_spec, "Handle registered");

        let required_keys = required_keys.into_iter().map(Into::into).collect();
        self.handles.push(Handle::new(
            id,
            match_spec,
            required_keys,
            boxed_callback(callback),
        ));
        Ok(id)
    }

    /// Registers a handle for a set of literal commands.
    pub fn on_command<C, CS, K, S, F, Fut, R>(
        &mut self,
        commands: C,
        required_keys: K,
        callback: F,
    ) -> RegistrationResult<HandleId>
    where
        C: IntoIterator<Item = CS>,
        CS: Into<String>,
        K: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        self.register(MatchSpec::commands(commands), required_keys, callback)
    }

    /// Registers a handle for a textual regular expression.
    pub fn on_regex<K, S, F, Fut, R>(
        &mut self,
        pattern: &str,
        required_keys: K,
        callback: F,
    ) -> RegistrationResult<HandleId>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply,
    {
        self.register(MatchSpec::pattern(pattern)?, required_keys, callback)
    }

    /// Queues a task to run once when the runtime starts.
    pub fn startup<F, Fut, E>(&self, name: impl Into<String>, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let run: StartupFn = Box::new(move || -> BoxFuture<'static, Result<(), BoxError>> {
            let fut = task();
            Box::pin(async move { fut.await.map_err(Into::<BoxError>::into) })
        });
        self.startup.lock().push(StartupTask {
            name: name.into(),
            run,
        });
    }

    /// Removes and returns every pending startup task.
    ///
    /// A task handed out here is never handed out again.
    pub fn take_startup_tasks(&self) -> Vec<StartupTask> {
        std::mem::take(&mut *self.startup.lock())
    }

    pub fn pending_startup_tasks(&self) -> usize {
        self.startup.lock().len()
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    pub fn handle(&self, id: HandleId) -> Option<&Handle> {
        self.handles.get(id)
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    // ─── Matching ────────────────────────────────────────────────────────────

    /// Evaluates `raw_command` against both indexes.
    ///
    /// Pure: the returned events carry no context.
    pub fn matches(&self, raw_command: &str) -> Matches {
        let mut matches = self.match_commands(raw_command);
        matches.extend(self.match_patterns(raw_command));
        trace!(plugin = %self.name, command = raw_command, matched = matches.len(), "Matched");
        matches
    }

    fn match_commands(&self, raw_command: &str) -> Matches {
        let mut matches = Matches::new();
        let tokens: Vec<&str> = split_tokens(raw_command).collect();
        let Some((&first, rest)) = tokens.split_first() else {
            return matches;
        };

        // Every candidate command is a prefix of `first`, so probe each
        // char-boundary prefix instead of scanning the whole index.
        let boundaries = first
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(first.len()));
        for split in boundaries {
            let (command, suffix) = first.split_at(split);
            let Some(ids) = self.commands.get(command) else {
                continue;
            };

            let args: Vec<String> = if suffix.is_empty() {
                rest.iter().map(|s| s.to_string()).collect()
            } else {
                std::iter::once(suffix)
                    .chain(rest.iter().copied())
                    .map(str::to_string)
                    .collect()
            };

            for &id in ids {
                matches.insert(id, Event::new(raw_command, args.clone()));
            }
        }

        matches
    }

    fn match_patterns(&self, raw_command: &str) -> Matches {
        let mut matches = Matches::new();
        for entry in self.patterns.values() {
            // The leftmost match starts at 0 whenever any match does.
            let anchored = entry
                .regex
                .find(raw_command)
                .is_some_and(|m| m.start() == 0);
            if anchored {
                for &id in &entry.handles {
                    matches.insert(id, Event::new(raw_command, Vec::new()));
                }
            }
        }
        matches
    }

    // ─── Invocation ──────────────────────────────────────────────────────────

    /// Runs handle `id` with the plugin's event and reply hooks applied.
    pub async fn call(&self, id: HandleId, event: Event) -> Result<Option<Reply>, BoxError> {
        let handle = self
            .handles
            .get(id)
            .ok_or_else(|| format!("plugin '{}' has no handle {id}", self.name))?;

        let event = match &self.event_hook {
            Some(hook) => hook(event),
            None => event,
        };

        let reply = handle.call(event).await?;

        Ok(match (&self.reply_hook, reply) {
            (Some(hook), Some(reply)) => hook(reply),
            (_, reply) => reply,
        })
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("handles", &self.handles.len())
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("patterns", &self.patterns.keys().collect::<Vec<_>>())
            .field("pending_startup_tasks", &self.pending_startup_tasks())
            .finish()
    }
}
