//! Echo Bot Example
//!
//! A console front end for the Clover framework: every line read from stdin
//! is dispatched on the `console` channel and replies are printed to stdout.
//!
//! # Plugins
//!
//! - `echo`: `echo <text>` repeats the text, with a prefix read from its settings file
//! - `greet`: `hello` / `hi` greets the user injected by the `user` provider
//! - `ping`: any line starting with `ping` answers `pong`
//! - `_whoami`: private, only loaded when listed in `plugins.enabled`
//!
//! All plugins come from the catalog, so `plugins.enabled` selects among
//! them; an empty list loads every public one.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --config clover.toml
//! ```

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::Parser;
use clover::prelude::*;
use clover::runtime::ConfigLoader;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

const CHANNEL: &str = "console";

/// Echo settings, read in `main` before the catalog is loaded.
static ECHO_SETTINGS: OnceLock<EchoSettings> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "echo-bot", about = "Console echo bot built on Clover")]
struct Args {
    /// Configuration file; defaults to clover.toml in the current directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. "development".
    #[arg(short, long)]
    profile: Option<String>,
}

/// Settings for the echo plugin, stored in `<settings_dir>/echo.toml`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct EchoSettings {
    prefix: String,
    uppercase: bool,
}

impl PluginSettings for EchoSettings {}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            prefix: "echo: ".to_string(),
            uppercase: false,
        }
    }
}

// ============================================================================
// Plugins
// ============================================================================

fn echo_plugin() -> RegistrationResult<Plugin> {
    let settings = ECHO_SETTINGS.get_or_init(EchoSettings::default);
    let prefix = settings.prefix.clone();
    let uppercase = settings.uppercase;

    let mut plugin = Plugin::new("echo").with_reply_hook(move |mut reply: Reply| {
        if let Value::String(text) = &reply.payload {
            let text = if uppercase { text.to_uppercase() } else { text.clone() };
            reply.payload = Value::String(format!("{prefix}{text}"));
        }
        reply
    });

    plugin.on_command(["echo", "复读"], NO_KEYS, |event: Event| async move {
        if event.args.is_empty() {
            None
        } else {
            Some(Reply::text("text", event.args_text()))
        }
    })?;
    Ok(plugin)
}

fn greet_plugin() -> RegistrationResult<Plugin> {
    let mut plugin = Plugin::new("greet");
    plugin.on_command(["hello", "hi"], ["user"], |event: Event| async move {
        let user = event.get_str("user").unwrap_or("stranger");
        Reply::text("text", format!("Hello, {user}!"))
    })?;
    Ok(plugin)
}

fn ping_plugin() -> RegistrationResult<Plugin> {
    let mut plugin = Plugin::new("ping");
    plugin.on_regex(r"^ping\b", NO_KEYS, |_event: Event| async {
        Reply::text("text", "pong")
    })?;
    plugin.startup("announce", || async {
        info!("ping plugin ready");
        Ok::<_, BoxError>(())
    });
    Ok(plugin)
}

fn whoami_plugin() -> RegistrationResult<Plugin> {
    let mut plugin = Plugin::new("_whoami");
    plugin.on_command(["whoami"], ["user", "line", "clock"], |event: Event| async move {
        Reply::new(
            "text",
            json!({
                "user": event.get("user"),
                "line": event.get("line"),
                "clock": event.get("clock"),
            }),
        )
    })?;
    Ok(plugin)
}

fn catalog() -> PluginCatalog {
    PluginCatalog::new()
        .with(PluginDescriptor::new("echo", echo_plugin))
        .with(PluginDescriptor::new("greet", greet_plugin))
        .with(PluginDescriptor::new("ping", ping_plugin))
        .with(PluginDescriptor::new("_whoami", whoami_plugin))
}

// ============================================================================
// Registries
// ============================================================================

/// Providers and senders specific to the console channel.
fn console_registry() -> ProviderRegistry {
    ProviderRegistry::new()
        .with_provider("user", Provider::from_input("username"))
        .with_provider("line", Provider::from_input("line"))
        .with_sender(
            "text",
            Sender::new(NO_KEYS, |payload: Value, _context: Context| async move {
                match payload {
                    Value::String(text) => println!("{text}"),
                    other => println!("{}", serde_json::to_string_pretty(&other)?),
                }
                Ok::<_, BoxError>(())
            }),
        )
}

/// Fallback providers shared by every channel.
fn default_registry() -> ProviderRegistry {
    ProviderRegistry::new().with_provider(
        "clock",
        Provider::new(NO_KEYS, |_context: Context| async {
            let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
            Ok::<_, BoxError>(now.as_secs())
        }),
    )
}

fn console_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "console".to_string())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }
    let config = loader.load()?;

    if let Some(path) = config.plugins.settings_path("echo") {
        let _ = ECHO_SETTINGS.set(EchoSettings::load_or_init(path)?);
    }

    let runtime = CloverRuntime::builder()
        .config(config)
        .catalog(catalog())
        .channel(CHANNEL, console_registry())
        .default_registry(default_registry())
        .build()?;

    let failures = runtime.start().await;
    if !failures.is_empty() {
        warn!(failed = failures.len(), "Some startup tasks failed");
    }

    info!("Reading commands from stdin. Press Ctrl+C to stop.");
    let user = console_user();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                let mut context = Context::new();
                context.insert("username".to_string(), Value::from(user.as_str()));
                context.insert("line".to_string(), Value::from(line_no));

                match runtime.dispatch(CHANNEL, &line, context).await {
                    Ok(0) => debug!(command = %line, "No reply"),
                    Ok(delivered) => debug!(command = %line, delivered, "Command handled"),
                    Err(e) => error!(command = %line, error = %e, "Dispatch failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}
