//! Routes prefixed chat messages to registered commands.

use std::sync::{Arc, Weak};

use {
    async_trait::async_trait,
    selfbot_common::{Event, EventKind},
    selfbot_events::{EventDispatcher, EventFilter, EventHandler, SendOptions, SubscriptionId},
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use crate::commands::{CommandInvocation, CommandRegistry};

/// Event handler that turns `<prefix><name> args...` into a command run.
///
/// Text returned by the command is sent back to the originating chat.
pub struct CommandRouter {
    prefix: String,
    commands: Arc<CommandRegistry>,
    dispatcher: Weak<EventDispatcher>,
}

impl CommandRouter {
    /// Subscribe a router for `prefix` to message events of both directions.
    pub fn install(
        dispatcher: &Arc<EventDispatcher>,
        commands: Arc<CommandRegistry>,
        prefix: impl Into<String>,
    ) -> SubscriptionId {
        let prefix = prefix.into();
        let router = Arc::new(Self {
            prefix: prefix.clone(),
            commands,
            dispatcher: Arc::downgrade(dispatcher),
        });
        let id = dispatcher.subscribe(
            EventKind::Message,
            router,
            EventFilter::any().text_starts_with(prefix.as_str()),
            None,
        );
        debug!(prefix = %prefix, subscription = id, "command router installed");
        id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl EventHandler for CommandRouter {
    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<Option<Value>> {
        let Some(body) = event.text.as_deref().and_then(|t| t.strip_prefix(&self.prefix)) else {
            return Ok(None);
        };
        let Some(invocation) = CommandInvocation::parse(body, Arc::clone(&event)) else {
            return Ok(None);
        };
        let Some(binding) = self.commands.get(&invocation.name) else {
            debug!(command = %invocation.name, "no such command");
            return Ok(None);
        };

        let name = invocation.name.clone();
        debug!(command = %name, plugin = %binding.plugin, args = invocation.args.len(), "running command");
        let reply = binding.handler.run(invocation).await?;

        if let Some(text) = reply.as_deref()
            && let Some(chat_id) = event.chat_id
        {
            match self.dispatcher.upgrade().and_then(|d| d.transport()) {
                Some(transport) => {
                    if let Err(e) = transport.send_message(chat_id, text, SendOptions::default()).await {
                        warn!(command = %name, chat_id, error = %e, "failed to send command reply");
                    }
                },
                None => debug!(command = %name, "no transport attached, reply dropped"),
            }
        }

        Ok(Some(json!({ "command": name, "reply": reply })))
    }
}
