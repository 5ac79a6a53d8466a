//! `help` plugin: lists registered commands.

use std::{
    collections::BTreeMap,
    fmt::Write,
    sync::{Arc, OnceLock},
};

use async_trait::async_trait;

use crate::{
    commands::{CommandBinding, CommandHandler, CommandInvocation, CommandRegistry, CommandSpec},
    context::PluginContext,
    manifest::PluginDescriptor,
    plugin::{Plugin, PluginRegistry},
};

pub const MODULE: &str = "help";

/// Built-in descriptor. `prefix` is only used to render command names.
pub fn descriptor(prefix: &str) -> PluginDescriptor {
    let mut d = PluginDescriptor::new(MODULE, env!("CARGO_PKG_VERSION"))
        .in_category("system")
        .described("Lists available commands and their usage");
    d.config.insert("prefix".into(), prefix.into());
    d
}

pub fn register(registry: &mut PluginRegistry) {
    registry.register_fn(MODULE, || Arc::new(HelpPlugin::default()) as Arc<dyn Plugin>);
}

struct Shared {
    commands: Arc<CommandRegistry>,
    prefix: String,
}

#[derive(Default)]
pub struct HelpPlugin {
    shared: Arc<OnceLock<Shared>>,
}

#[async_trait]
impl Plugin for HelpPlugin {
    fn commands(&self) -> Vec<CommandSpec> {
        let handler = Arc::new(HelpCommand {
            shared: Arc::clone(&self.shared),
        });
        vec![
            CommandSpec::new("help", handler)
                .described("Show available commands")
                .usage(".help [command]"),
        ]
    }

    async fn initialize(&self, ctx: &PluginContext) -> anyhow::Result<bool> {
        // A fresh instance is created per load, so this is set exactly once.
        let _ = self.shared.set(Shared {
            commands: Arc::clone(&ctx.commands),
            prefix: ctx.config_or("prefix", ".".to_string()),
        });
        Ok(true)
    }
}

struct HelpCommand {
    shared: Arc<OnceLock<Shared>>,
}

impl Shared {
    fn overview(&self, bindings: &[CommandBinding]) -> String {
        let mut by_category: BTreeMap<&str, Vec<&CommandBinding>> = BTreeMap::new();
        for b in bindings {
            by_category.entry(b.category.as_str()).or_default().push(b);
        }

        let mut out = String::from("Available commands:");
        for (category, list) in by_category {
            let _ = write!(out, "\n\n[{category}]");
            for b in list {
                let _ = write!(out, "\n{}{}", self.prefix, b.name);
                if !b.description.is_empty() {
                    let _ = write!(out, " - {}", b.description);
                }
            }
        }
        out
    }

    fn details(&self, b: &CommandBinding) -> String {
        let mut out = format!("{}{} ({})", self.prefix, b.name, b.plugin);
        if !b.description.is_empty() {
            let _ = write!(out, "\n{}", b.description);
        }
        if !b.usage.is_empty() {
            let _ = write!(out, "\nUsage: {}", b.usage);
        }
        out
    }
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn run(&self, invocation: CommandInvocation) -> anyhow::Result<Option<String>> {
        let Some(shared) = self.shared.get() else {
            anyhow::bail!("help plugin is not initialized");
        };
        let reply = match invocation.args.first() {
            Some(name) => {
                let name = name.trim_start_matches(shared.prefix.as_str());
                match shared.commands.get(name) {
                    Some(binding) => shared.details(&binding),
                    None => format!("Unknown command: {name}"),
                }
            },
            None => {
                let bindings = shared.commands.list(None);
                if bindings.is_empty() {
                    "No commands are registered.".to_string()
                } else {
                    shared.overview(&bindings)
                }
            },
        };
        Ok(Some(reply))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{commands::command_fn, context::PluginScheduler},
        selfbot_common::Event,
        selfbot_events::EventDispatcher,
        selfbot_scheduler::{InMemoryStore, Scheduler},
        serde_json::Map,
    };

    async fn noop(_inv: CommandInvocation) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn bind(registry: &CommandRegistry, name: &str, category: &str, usage: &str) {
        registry.register(CommandBinding {
            name: name.into(),
            plugin: "tools".into(),
            category: category.into(),
            description: format!("{name} things"),
            usage: usage.into(),
            handler: command_fn(noop),
        });
    }

    async fn run(plugin: &HelpPlugin, body: &str) -> String {
        let spec = plugin.commands().remove(0);
        let inv = CommandInvocation::parse(body, Arc::new(Event::message(body))).unwrap();
        spec.handler.run(inv).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn lists_by_category_and_shows_usage() {
        let commands = Arc::new(CommandRegistry::new());
        bind(&commands, "weather", "tools", ".weather <city>");
        bind(&commands, "ban", "admin", ".ban <user>");

        let plugin = HelpPlugin::default();
        let ctx = PluginContext::new(
            MODULE,
            Map::new(),
            PluginScheduler::new(Scheduler::new(Arc::new(InMemoryStore::new())), MODULE),
            Arc::clone(&commands),
            Arc::new(EventDispatcher::new()),
        );
        assert!(plugin.initialize(&ctx).await.unwrap());

        let overview = run(&plugin, "help").await;
        let admin = overview.find("[admin]").unwrap();
        let tools = overview.find("[tools]").unwrap();
        assert!(admin < tools);
        assert!(overview.contains(".weather - weather things"));

        let details = run(&plugin, "help .weather").await;
        assert!(details.contains("Usage: .weather <city>"));
        assert_eq!(run(&plugin, "help nope").await, "Unknown command: nope");
    }

    #[tokio::test]
    async fn uninitialized_help_fails() {
        let plugin = HelpPlugin::default();
        let spec = plugin.commands().remove(0);
        let inv = CommandInvocation::parse("help", Arc::new(Event::message(".help"))).unwrap();
        assert!(spec.handler.run(inv).await.is_err());
    }
}
