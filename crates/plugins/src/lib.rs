//! Plugin lifecycle: discovery, catalogue, loading, and the command registry.
//!
//! Plugins are compiled into the binary and registered in a
//! [`PluginRegistry`] under a module name. A manifest on disk
//! (`plugin.{toml,yaml,yml,json}`) makes a plugin known to the
//! [`PluginManager`], which tracks enable/disable state in the
//! `plugins.yml` catalogue.

pub mod bundled;
pub mod catalogue;
pub mod commands;
pub mod context;
pub mod discovery;
pub mod error;
pub mod install;
pub mod manager;
pub mod manifest;
pub mod plugin;
pub mod router;

pub use {
    catalogue::CatalogueStore,
    commands::{CommandBinding, CommandHandler, CommandInvocation, CommandRegistry, CommandSpec, command_fn},
    context::{PluginContext, PluginScheduler},
    error::{Error, Result},
    manager::{ManagerOptions, PluginManager},
    manifest::{CommandInfo, MANIFEST_FILENAMES, PluginDescriptor},
    plugin::{Plugin, PluginFactory, PluginRegistry, SubscriptionSpec},
    router::CommandRouter,
};
