//! Plugins compiled into every build.

pub mod help;

use crate::{manifest::PluginDescriptor, plugin::PluginRegistry};

/// Register the factories of every bundled plugin.
pub fn register_bundled(registry: &mut PluginRegistry) {
    help::register(registry);
}

/// Descriptors for the bundled plugins, for [`crate::PluginManager::register_builtin`].
pub fn bundled_descriptors(prefix: &str) -> Vec<PluginDescriptor> {
    vec![help::descriptor(prefix)]
}
