//! The plugin trait and the compiled plugin registry.

use std::{collections::BTreeMap, sync::Arc};

use {
    async_trait::async_trait,
    selfbot_common::EventKind,
    selfbot_events::{EventFilter, EventHandler},
};

use crate::{commands::CommandSpec, context::PluginContext};

/// An event subscription a plugin wants while it is loaded.
#[derive(Clone)]
pub struct SubscriptionSpec {
    pub kind: EventKind,
    pub filter: EventFilter,
    pub handler: Arc<dyn EventHandler>,
}

impl SubscriptionSpec {
    pub fn new(kind: EventKind, filter: EventFilter, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            kind,
            filter,
            handler,
        }
    }
}

/// A loadable plugin.
///
/// `commands` and `subscriptions` are read after a successful `initialize`
/// and registered under the plugin's name. Everything is torn down on unload.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    fn subscriptions(&self) -> Vec<SubscriptionSpec> {
        Vec::new()
    }

    /// Returning `Ok(false)` aborts the load.
    async fn initialize(&self, _ctx: &PluginContext) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn cleanup(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Produces a fresh plugin instance for every load.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Module name → factory, for every plugin compiled into the binary.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(module.into(), factory);
    }

    /// Register a factory closure.
    pub fn register_fn<F>(&mut self, module: impl Into<String>, f: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(module, Arc::new(f));
    }

    pub fn create(&self, module: &str) -> Option<Arc<dyn Plugin>> {
        self.factories.get(module).map(|factory| factory())
    }

    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }

    pub fn modules(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
