//! Command registry shared by plugins and the command router.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    selfbot_common::Event,
    tracing::{debug, warn},
};

// ── Handler ─────────────────────────────────────────────────────────────────

/// One parsed command invocation.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    /// Command name without the prefix.
    pub name: String,
    /// Whitespace-separated arguments.
    pub args: Vec<String>,
    /// Everything after the command name, trimmed.
    pub raw_args: String,
    pub event: Arc<Event>,
}

impl CommandInvocation {
    /// Split `body` (text after the prefix) into name and arguments.
    pub fn parse(body: &str, event: Arc<Event>) -> Option<Self> {
        let body = body.trim_start();
        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            args: rest.split_whitespace().map(str::to_string).collect(),
            raw_args: rest.to_string(),
            event,
        })
    }
}

/// Runs a command. Returned text is sent back to the originating chat.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, invocation: CommandInvocation) -> anyhow::Result<Option<String>>;
}

struct FnCommand<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> CommandHandler for FnCommand<F>
where
    F: Fn(CommandInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send,
{
    async fn run(&self, invocation: CommandInvocation) -> anyhow::Result<Option<String>> {
        (self.f)(invocation).await
    }
}

/// Wrap an async closure as a command handler.
pub fn command_fn<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(CommandInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
{
    Arc::new(FnCommand { f })
}

// ── Spec / binding ──────────────────────────────────────────────────────────

/// A command as a plugin declares it.
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub usage: String,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            usage: String::new(),
            handler,
        }
    }

    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }
}

/// A registered command, owned by a plugin.
#[derive(Clone)]
pub struct CommandBinding {
    pub name: String,
    pub plugin: String,
    pub category: String,
    pub description: String,
    pub usage: String,
    pub handler: Arc<dyn CommandHandler>,
}

impl fmt::Debug for CommandBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBinding")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Command name → binding. Names are unique; the last registration wins.
#[derive(Default)]
pub struct CommandRegistry {
    bindings: RwLock<BTreeMap<String, CommandBinding>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding, returning the one it replaced.
    pub fn register(&self, binding: CommandBinding) -> Option<CommandBinding> {
        let name = binding.name.clone();
        let plugin = binding.plugin.clone();
        let previous = self
            .bindings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.clone(), binding);
        match &previous {
            Some(old) if old.plugin != plugin => warn!(
                command = %name,
                previous = %old.plugin,
                plugin = %plugin,
                "command name collision, overwriting previous binding"
            ),
            _ => debug!(command = %name, plugin = %plugin, "command registered"),
        }
        previous
    }

    /// Remove every binding owned by `plugin`.
    pub fn remove_plugin(&self, plugin: &str) -> usize {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        let before = bindings.len();
        bindings.retain(|_, b| b.plugin != plugin);
        before - bindings.len()
    }

    pub fn get(&self, name: &str) -> Option<CommandBinding> {
        self.bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.get(name).map(|b| b.handler)
    }

    /// All bindings sorted by name, optionally restricted to one category.
    pub fn list(&self, category: Option<&str>) -> Vec<CommandBinding> {
        self.bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|b| category.is_none_or(|c| b.category == c))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
