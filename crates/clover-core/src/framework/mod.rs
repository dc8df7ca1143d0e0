//! Framework layer: handle registration and per-plugin command matching.

pub mod handle;
pub mod plugin;

pub use handle::{BoxedCallback, Handle, HandleFuture, HandleId, MatchSpec};
pub use plugin::{EventHook, Matches, NO_KEYS, Plugin, ReplyHook, StartupTask};
