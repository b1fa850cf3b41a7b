//! Command registry and dispatch
//!
//! Chat text prefixed with `!` is routed here by the session receive loop.
//! The registry maps a declared command name to its handler, permission
//! guards, and usage string. It is populated once during startup and
//! read-only afterwards, so concurrent reads need no locking.

use crate::api::ChatApi;
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::store::CommandStore;
use async_trait::async_trait;
use std::collections::HashMap;

/// Sentinel prefix identifying chat text as a command invocation
pub const COMMAND_PREFIX: char = '!';

/// Built-in command names, declared explicitly per handler
pub const HELP: &str = "!help";
pub const PROJECT: &str = "!project";
pub const SET_PROJECT: &str = "!set-project";

/// Store key holding the current project description
const PROJECT_KEY: &str = "project";

/// Pure permission predicate; guards must not have side effects
pub type Guard = fn(&RequestContext<'_>) -> bool;

/// The author is the channel owner
pub fn is_admin(ctx: &RequestContext<'_>) -> bool {
    ctx.author == ctx.config.chat_channel_user_name
}

/// Ephemeral context built per dispatched command
pub struct RequestContext<'a> {
    pub config: &'a RuntimeConfig,
    pub text: &'a str,
    pub author: &'a str,
    pub store: &'a CommandStore,
    pub api: &'a dyn ChatApi,
    pub registry: &'a CommandRegistry,
}

/// A command implementation invoked after all guards pass
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, ctx: &RequestContext<'_>) -> Result<()>;
}

/// A registered command: name, handler, guards, and rendered usage
pub struct Command {
    name: &'static str,
    handler: Box<dyn CommandHandler>,
    guards: Vec<Guard>,
    usage: String,
}

impl Command {
    /// Declared command name, including the sentinel prefix
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Usage string, rendered once at registration
    pub fn usage(&self) -> &str {
        &self.usage
    }
}

/// Immutable mapping from command name to command
///
/// Built once by [`CommandRegistry::standard`] before the event loop starts.
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    /// Build the registry with the built-in command set
    pub fn standard() -> Result<Self> {
        let mut registry = Self {
            commands: HashMap::new(),
        };

        registry.register(HELP, Box::new(Help), Vec::new(), |name| {
            format!(
                "{name} - to list available commands or \
                 {name} <command_name> - to show usage for provided command"
            )
        })?;

        registry.register(PROJECT, Box::new(Project), Vec::new(), |name| {
            format!("{name} - describes current project or what I'm working on")
        })?;

        registry.register(
            SET_PROJECT,
            Box::new(SetProject),
            vec![is_admin as Guard],
            |name| format!("{name} - set output for {PROJECT}"),
        )?;

        Ok(registry)
    }

    /// Register a command; duplicate names are a fatal configuration error
    fn register(
        &mut self,
        name: &'static str,
        handler: Box<dyn CommandHandler>,
        guards: Vec<Guard>,
        usage: impl FnOnce(&str) -> String,
    ) -> Result<()> {
        if self.commands.contains_key(name) {
            return Err(Error::Config(format!("Repeating command name: {}", name)));
        }
        let usage = usage(name);
        self.commands.insert(
            name.to_string(),
            Command {
                name,
                handler,
                guards,
                usage,
            },
        );
        Ok(())
    }

    /// Look up a command by its full prefixed name
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// All registered command names, sorted lexicographically
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.commands.values().map(|c| c.name).collect();
        names.sort_unstable();
        names
    }
}

/// Routes chat text to registered commands
pub struct Dispatcher {
    registry: CommandRegistry,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    /// Dispatch one line of chat text from `author`
    ///
    /// The first whitespace-delimited token, lowercased, selects the
    /// command; unknown names fall back to help with the original text
    /// preserved. A failing guard produces exactly one rejection reply and
    /// no other side effect.
    pub async fn dispatch(
        &self,
        config: &RuntimeConfig,
        store: &CommandStore,
        api: &dyn ChatApi,
        text: &str,
        author: &str,
    ) -> Result<()> {
        let candidate = text
            .split_whitespace()
            .next()
            .map(|token| token.to_ascii_lowercase())
            .unwrap_or_default();

        let command = match self.registry.get(&candidate) {
            Some(command) => command,
            None => self
                .registry
                .get(HELP)
                .ok_or_else(|| Error::Command("help command not registered".to_string()))?,
        };

        let ctx = RequestContext {
            config,
            text,
            author,
            store,
            api,
            registry: &self.registry,
        };

        if command.guards.iter().all(|guard| guard(&ctx)) {
            command.handler.run(&ctx).await
        } else {
            api.send_message(
                config,
                &format!("@{} you aren't allowed to execute this command", author),
            )
            .await
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in commands
// ---------------------------------------------------------------------------

/// `!help` — list commands, or show usage for one
struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn run(&self, ctx: &RequestContext<'_>) -> Result<()> {
        let args: Vec<&str> = ctx.text.split_whitespace().skip(1).collect();

        match args.as_slice() {
            [] => {
                let names = ctx.registry.names().join(", ");
                ctx.api
                    .send_message(ctx.config, &format!("Bot commands: {}", names))
                    .await
            }
            [name] => match ctx.registry.get(&name.to_ascii_lowercase()) {
                Some(command) => {
                    ctx.api
                        .send_message(
                            ctx.config,
                            &format!("@{} {} {}", ctx.author, name, command.usage()),
                        )
                        .await
                }
                None => {
                    ctx.api
                        .send_message(ctx.config, &format!("@{} {} not found", ctx.author, name))
                        .await
                }
            },
            _ => {
                let usage = ctx.registry.get(HELP).map(|c| c.usage()).unwrap_or_default();
                ctx.api
                    .send_message(
                        ctx.config,
                        &format!("@{} too many arguments. Type {}", ctx.author, usage),
                    )
                    .await
            }
        }
    }
}

/// `!project` — reply with the stored project description
struct Project;

#[async_trait]
impl CommandHandler for Project {
    async fn run(&self, ctx: &RequestContext<'_>) -> Result<()> {
        let value = ctx.store.get(PROJECT_KEY)?;
        ctx.api
            .send_message(ctx.config, &format!("@{} {}", ctx.author, value))
            .await
    }
}

/// `!set-project` — store the remainder of the line as the description
struct SetProject;

#[async_trait]
impl CommandHandler for SetProject {
    async fn run(&self, ctx: &RequestContext<'_>) -> Result<()> {
        let description = ctx
            .text
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest.trim())
            .unwrap_or_default();

        if description.is_empty() {
            return ctx
                .api
                .send_message(
                    ctx.config,
                    &format!("@{} no project description provided", ctx.author),
                )
                .await;
        }

        ctx.store.set(PROJECT_KEY, description)?;
        ctx.api
            .send_message(
                ctx.config,
                &format!("@{} project description updated", ctx.author),
            )
            .await
    }
}
