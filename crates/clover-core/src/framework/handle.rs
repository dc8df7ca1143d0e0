//! Handles: one registered match rule each.
//!
//! A [`Handle`] binds a [`MatchSpec`] and a set of required context keys to a
//! type-erased callback. Both the match rule and the keys are fixed once the handle
//! is registered on its plugin.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use crate::foundation::error::{BoxError, RegistrationError, RegistrationResult};
use crate::foundation::event::{Event, IntoReply, Reply};

/// Position of a handle within its plugin, assigned in registration order.
pub type HandleId = usize;

/// Future returned by a type-erased handle callback.
pub type HandleFuture = BoxFuture<'static, Result<Option<Reply>, BoxError>>;

/// A type-erased handle callback.
pub type BoxedCallback = Arc<dyn Fn(Event) -> HandleFuture + Send + Sync>;

/// Returns `true` for characters that separate command tokens.
///
/// Unicode whitespace plus the ASCII information separators U+001C..=U+001F.
pub fn is_token_separator(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Splits `input` into non-empty tokens on [`is_token_separator`].
pub fn split_tokens(input: &str) -> impl Iterator<Item = &str> {
    input.split(is_token_separator).filter(|token| !token.is_empty())
}

// ============================================================================
// MatchSpec
// ============================================================================

/// What a handle matches against.
///
/// The kind is decided once at registration; matching never inspects types at
/// runtime.
#[derive(Debug, Clone)]
pub enum MatchSpec {
    /// Literal commands, matched as prefixes of the first token.
    Commands(BTreeSet<String>),
    /// A regular expression that must match at the start of the raw command.
    Pattern(Regex),
}

impl MatchSpec {
    /// Builds a literal command set.
    pub fn commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Commands(commands.into_iter().map(Into::into).collect())
    }

    /// Builds a single literal command.
    pub fn command(command: impl Into<String>) -> Self {
        Self::Commands(BTreeSet::from([command.into()]))
    }

    /// Compiles a textual regular expression.
    pub fn pattern(pattern: &str) -> RegistrationResult<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|source| RegistrationError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Returns `true` for literal command sets.
    pub fn is_commands(&self) -> bool {
        matches!(self, Self::Commands(_))
    }

    pub(crate) fn validate(&self) -> RegistrationResult<()> {
        match self {
            Self::Commands(commands) if commands.is_empty() => Err(RegistrationError::EmptyCommands),
            Self::Commands(commands) => match commands
                .iter()
                .find(|c| c.chars().any(is_token_separator))
            {
                Some(command) => Err(RegistrationError::InvalidCommand {
                    command: command.clone(),
                }),
                None => Ok(()),
            },
            Self::Pattern(_) => Ok(()),
        }
    }
}

impl From<Regex> for MatchSpec {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commands(commands) => {
                let list: Vec<&str> = commands.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", list.join(", "))
            }
            Self::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// A registered command binding.
#[derive(Clone)]
pub struct Handle {
    id: HandleId,
    match_spec: MatchSpec,
    required_keys: BTreeSet<String>,
    callback: BoxedCallback,
}

impl Handle {
    pub(crate) fn new(
        id: HandleId,
        match_spec: MatchSpec,
        required_keys: BTreeSet<String>,
        callback: BoxedCallback,
    ) -> Self {
        Self {
            id,
            match_spec,
            required_keys,
            callback,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn match_spec(&self) -> &MatchSpec {
        &self.match_spec
    }

    /// Context keys that must be injected before the callback runs.
    pub fn required_keys(&self) -> &BTreeSet<String> {
        &self.required_keys
    }

    /// Invokes the callback directly, without any plugin hooks.
    pub fn call(&self, event: Event) -> HandleFuture {
        (self.callback)(event)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("match_spec", &self.match_spec)
            .field("required_keys", &self.required_keys)
            .finish_non_exhaustive()
    }
}

/// Erases an async callback into a [`BoxedCallback`].
pub(crate) fn boxed_callback<F, Fut, R>(f: F) -> BoxedCallback
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    Arc::new(move |event: Event| -> HandleFuture {
        let fut = f(event);
        Box::pin(async move { fut.await.into_reply() })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_deduplicate() {
        let spec = MatchSpec::commands(["echo", "say", "echo"]);
        match spec {
            MatchSpec::Commands(set) => assert_eq!(set.len(), 2),
            MatchSpec::Pattern(_) => panic!("expected commands"),
        }
    }

    #[test]
    fn test_invalid_pattern() {
        let err = MatchSpec::pattern("(unclosed").unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidPattern { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_and_whitespace() {
        assert!(matches!(
            MatchSpec::commands(Vec::<String>::new()).validate(),
            Err(RegistrationError::EmptyCommands)
        ));
        assert!(matches!(
            MatchSpec::command("two words").validate(),
            Err(RegistrationError::InvalidCommand { .. })
        ));
        assert!(MatchSpec::command("echo").validate().is_ok());
        assert!(MatchSpec::pattern("^ping").unwrap().validate().is_ok());
    }

    #[test]
    fn test_information_separators_split_tokens() {
        let tokens: Vec<&str> = split_tokens("echo\u{1f}x \u{1c}y\t\u{3000}z").collect();
        assert_eq!(tokens, vec!["echo", "x", "y", "z"]);
        assert!(matches!(
            MatchSpec::command("a\u{1e}b").validate(),
            Err(RegistrationError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(MatchSpec::commands(["b", "a"]).to_string(), "{a, b}");
        assert_eq!(MatchSpec::pattern("^ping").unwrap().to_string(), "/^ping/");
    }

    #[tokio::test]
    async fn test_boxed_callback_converts_output() {
        let callback = boxed_callback(|event: Event| async move {
            Reply::text("text", event.args_text())
        });
        let reply = callback(Event::new("echo hi", vec!["hi".into()]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, Reply::text("text", "hi"));
    }
}
