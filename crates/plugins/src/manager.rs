//! Plugin lifecycle management.
//!
//! Every public operation reports success as a `bool` and logs the reason
//! for a failure; lifecycle errors never propagate to callers. The catalogue
//! is rewritten only when an operation changed it.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    selfbot_config::PluginsConfig,
    selfbot_events::EventDispatcher,
    selfbot_scheduler::Scheduler,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    catalogue::CatalogueStore,
    commands::{CommandBinding, CommandHandler, CommandRegistry},
    context::{PluginContext, PluginScheduler},
    discovery::discover_plugins,
    install::{copy_plugin_tree, install_target, remove_managed},
    manifest::{CommandInfo, PluginDescriptor, find_manifest, load_manifest},
    plugin::{Plugin, PluginRegistry},
};

/// Filesystem locations the manager works with.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Discovery roots, scanned in order.
    pub roots: Vec<PathBuf>,
    /// Managed install directory. Always scanned first.
    pub install_dir: PathBuf,
    pub catalogue_path: PathBuf,
}

impl ManagerOptions {
    pub fn from_config(config: &PluginsConfig) -> Self {
        Self {
            roots: config.roots(),
            install_dir: config.resolved_install_dir(),
            catalogue_path: config.resolved_catalogue_path(),
        }
    }
}

#[derive(Default)]
struct State {
    plugins: BTreeMap<String, PluginDescriptor>,
    loaded: HashMap<String, Arc<dyn Plugin>>,
}

impl State {
    fn dependencies_ready(&self, name: &str) -> bool {
        self.plugins.get(name).is_some_and(|d| {
            d.requires.iter().all(|dep| {
                self.loaded.contains_key(dep)
                    && self.plugins.get(dep).is_some_and(|p| p.is_enabled)
            })
        })
    }
}

/// Owns plugin descriptors and loaded instances, and registers their
/// commands, subscriptions, and tasks with the shared services.
pub struct PluginManager {
    options: ManagerOptions,
    catalogue: CatalogueStore,
    registry: PluginRegistry,
    commands: Arc<CommandRegistry>,
    dispatcher: Arc<EventDispatcher>,
    scheduler: Arc<Scheduler>,
    state: Mutex<State>,
}

impl PluginManager {
    /// Create a manager, seeding its state from the catalogue on disk.
    pub fn new(
        mut options: ManagerOptions,
        registry: PluginRegistry,
        dispatcher: Arc<EventDispatcher>,
        scheduler: Arc<Scheduler>,
        commands: Arc<CommandRegistry>,
    ) -> Self {
        if !options.roots.contains(&options.install_dir) {
            options.roots.insert(0, options.install_dir.clone());
        }

        let catalogue = CatalogueStore::new(options.catalogue_path.clone());
        let plugins = match catalogue.load() {
            Ok(list) => list.into_iter().map(|d| (d.name.clone(), d)).collect(),
            Err(e) => {
                warn!(error = %e, path = %catalogue.path().display(), "ignoring unreadable plugin catalogue");
                BTreeMap::new()
            },
        };

        Self {
            options,
            catalogue,
            registry,
            commands,
            dispatcher,
            scheduler,
            state: Mutex::new(State {
                plugins,
                loaded: HashMap::new(),
            }),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn command_registry(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// Make a compiled-in plugin known without a manifest on disk.
    ///
    /// The catalogue's `is_enabled` wins; its `config` keys override the
    /// given ones.
    pub async fn register_builtin(&self, mut descriptor: PluginDescriptor) -> bool {
        let mut state = self.state.lock().await;
        if let Some(known) = state.plugins.get(&descriptor.name) {
            descriptor.is_enabled = known.is_enabled;
            for (key, value) in &known.config {
                descriptor.config.insert(key.clone(), value.clone());
            }
            descriptor.is_loaded = known.is_loaded;
            descriptor.commands = known.commands.clone();
        }
        debug!(plugin = %descriptor.name, "built-in plugin registered");
        state.plugins.insert(descriptor.name.clone(), descriptor);
        self.persist(&state).await
    }

    // ── Discovery ───────────────────────────────────────────────────────

    /// Scan the roots and reconcile what was found with the catalogue.
    pub async fn discover(&self) -> Vec<PluginDescriptor> {
        let roots = self.options.roots.clone();
        let mut found = match tokio::task::spawn_blocking(move || discover_plugins(&roots)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "plugin discovery task failed");
                return Vec::new();
            },
        };

        let state = self.state.lock().await;
        for descriptor in &mut found {
            if let Some(known) = state.plugins.get(&descriptor.name) {
                descriptor.is_enabled = known.is_enabled;
                descriptor.config = known.config.clone();
            }
        }
        found
    }

    /// Discover, merge into the catalogue, and persist.
    pub async fn scan(&self) -> bool {
        let found = self.discover().await;
        let count = found.len();

        let mut state = self.state.lock().await;
        for mut descriptor in found {
            if let Some(existing) = state.plugins.get(&descriptor.name)
                && existing.is_loaded
            {
                descriptor.is_loaded = true;
                descriptor.commands = existing.commands.clone();
            }
            state.plugins.insert(descriptor.name.clone(), descriptor);
        }
        info!(count, "plugin scan complete");
        self.persist(&state).await
    }

    // ── Load / unload ───────────────────────────────────────────────────

    pub async fn load(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(changed) = report(name, "load", self.load_locked(&mut state, name).await) else {
            return false;
        };
        if changed {
            self.persist(&state).await;
        }
        true
    }

    pub async fn unload(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(changed) = report(name, "unload", self.unload_locked(&mut state, name).await)
        else {
            return false;
        };
        if changed {
            self.persist(&state).await;
        }
        true
    }

    /// Unload, then load again only if the unload succeeded.
    pub async fn reload(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        let ok = report(name, "unload", self.unload_locked(&mut state, name).await).is_some()
            && report(name, "load", self.load_locked(&mut state, name).await).is_some();
        self.persist(&state).await;
        ok
    }

    /// Persist the enabled flag, then load.
    pub async fn enable(&self, name: &str) -> bool {
        self.set_enabled(name, true).await
    }

    /// Persist the disabled flag, then unload.
    pub async fn disable(&self, name: &str) -> bool {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut state = self.state.lock().await;
        let Some(descriptor) = state.plugins.get_mut(name) else {
            warn!(plugin = name, error = %Error::unknown_plugin(name), "cannot change enabled flag");
            return false;
        };
        descriptor.is_enabled = enabled;
        if !self.persist(&state).await {
            return false;
        }
        info!(plugin = name, enabled, "plugin enabled flag changed");

        let changed = if enabled {
            report(name, "load", self.load_locked(&mut state, name).await)
        } else {
            report(name, "unload", self.unload_locked(&mut state, name).await)
        };
        if changed == Some(true) {
            self.persist(&state).await;
        }
        changed.is_some()
    }

    /// Load every enabled plugin, dependencies first.
    ///
    /// Returns true when every enabled plugin ended up loaded.
    pub async fn load_all(&self) -> bool {
        let mut state = self.state.lock().await;
        let mut pending: Vec<String> = state
            .plugins
            .values()
            .filter(|d| d.is_enabled && !state.loaded.contains_key(&d.name))
            .map(|d| d.name.clone())
            .collect();

        let mut changed = false;
        loop {
            let ready: Vec<String> = pending
                .iter()
                .filter(|name| state.dependencies_ready(name))
                .cloned()
                .collect();
            if ready.is_empty() {
                break;
            }
            pending.retain(|name| !ready.contains(name));
            for name in ready {
                changed |= report(&name, "load", self.load_locked(&mut state, &name).await)
                    == Some(true);
            }
        }
        // What is left has unmet dependencies; one attempt each logs why.
        for name in &pending {
            changed |= report(name, "load", self.load_locked(&mut state, name).await) == Some(true);
        }

        let enabled = state.plugins.values().filter(|d| d.is_enabled).count();
        let loaded = state.loaded.len();
        info!(loaded, enabled, "plugins loaded");
        if changed {
            self.persist(&state).await;
        }
        loaded == enabled
    }

    /// Run every loaded plugin's cleanup and drop its registrations.
    ///
    /// Scheduled tasks stay persisted so the next start can re-arm them.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let loaded: Vec<(String, Arc<dyn Plugin>)> = state.loaded.drain().collect();
        for (name, instance) in loaded {
            run_cleanup(&name, instance.as_ref()).await;
            self.commands.remove_plugin(&name);
            self.dispatcher.unsubscribe_owner(&name);
            if let Some(d) = state.plugins.get_mut(&name) {
                d.is_loaded = false;
            }
        }
        info!("plugins shut down");
    }

    /// Returns whether the plugin was newly loaded.
    async fn load_locked(&self, state: &mut State, name: &str) -> Result<bool> {
        let descriptor = state
            .plugins
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_plugin(name))?;
        if !descriptor.is_enabled {
            return Err(Error::Disabled {
                name: name.to_string(),
            });
        }
        if state.loaded.contains_key(name) {
            debug!(plugin = name, "plugin already loaded");
            return Ok(false);
        }
        for dep in &descriptor.requires {
            match state.plugins.get(dep) {
                None => return Err(Error::dependency(name, dep, "not installed")),
                Some(d) if !d.is_enabled => return Err(Error::dependency(name, dep, "disabled")),
                Some(_) if !state.loaded.contains_key(dep) => {
                    return Err(Error::dependency(name, dep, "not loaded"));
                },
                Some(_) => {},
            }
        }

        let instance = self
            .registry
            .create(&descriptor.module)
            .ok_or_else(|| Error::UnknownModule {
                plugin: name.to_string(),
                module: descriptor.module.clone(),
            })?;

        let ctx = PluginContext::new(
            name,
            descriptor.config.clone(),
            PluginScheduler::new(Arc::clone(&self.scheduler), name),
            Arc::clone(&self.commands),
            Arc::clone(&self.dispatcher),
        );
        let failure = match instance.initialize(&ctx).await {
            Ok(true) => None,
            Ok(false) => Some("initialize returned false".to_string()),
            Err(e) => Some(format!("{e:#}")),
        };
        if let Some(reason) = failure {
            ctx.scheduler.rollback().await;
            return Err(Error::initialize(name, reason));
        }

        let mut infos = Vec::new();
        for spec in instance.commands() {
            infos.push(CommandInfo {
                name: spec.name.clone(),
                description: spec.description.clone(),
                usage: spec.usage.clone(),
                handler: None,
            });
            self.commands.register(CommandBinding {
                name: spec.name,
                plugin: name.to_string(),
                category: descriptor.category.clone(),
                description: spec.description,
                usage: spec.usage,
                handler: spec.handler,
            });
        }
        let subscriptions = instance.subscriptions();
        let subscription_count = subscriptions.len();
        for sub in subscriptions {
            self.dispatcher
                .subscribe(sub.kind, sub.handler, sub.filter, Some(name));
        }

        let command_count = infos.len();
        if let Some(d) = state.plugins.get_mut(name) {
            d.commands = infos;
            d.is_loaded = true;
        }
        state.loaded.insert(name.to_string(), instance);
        info!(
            plugin = name,
            version = %descriptor.version,
            commands = command_count,
            subscriptions = subscription_count,
            "plugin loaded"
        );
        Ok(true)
    }

    /// Returns whether a loaded instance was torn down.
    async fn unload_locked(&self, state: &mut State, name: &str) -> Result<bool> {
        if !state.plugins.contains_key(name) {
            return Err(Error::unknown_plugin(name));
        }
        let instance = state.loaded.remove(name);
        if let Some(instance) = &instance {
            run_cleanup(name, instance.as_ref()).await;
        }

        let commands = self.commands.remove_plugin(name);
        let subscriptions = self.dispatcher.unsubscribe_owner(name);
        let tasks = self.scheduler.unschedule_owner(name).await;
        if let Some(d) = state.plugins.get_mut(name) {
            d.commands.clear();
            d.is_loaded = false;
        }
        info!(plugin = name, commands, subscriptions, tasks, "plugin unloaded");
        Ok(instance.is_some())
    }

    // ── Install / uninstall ─────────────────────────────────────────────

    /// Copy the plugin at `source` into the install directory and rescan.
    pub async fn install(&self, source: &Path) -> bool {
        match self.install_inner(source).await {
            Ok(name) => {
                info!(plugin = %name, source = %source.display(), "plugin installed");
                true
            },
            Err(e) => {
                warn!(source = %source.display(), error = %e, "plugin install failed");
                false
            },
        }
    }

    async fn install_inner(&self, source: &Path) -> Result<String> {
        let manifest =
            find_manifest(source).ok_or_else(|| Error::manifest(source, "no plugin manifest found"))?;
        let descriptor = load_manifest(&manifest)?;
        let target = install_target(&self.options.install_dir, &descriptor);

        let (src, root, dst) = (
            source.to_path_buf(),
            self.options.install_dir.clone(),
            target.clone(),
        );
        let copied = tokio::task::spawn_blocking(move || copy_plugin_tree(&src, &root, &dst))
            .await
            .map_err(|e| Error::external("install task failed", e))??;
        debug!(plugin = %descriptor.name, files = copied, target = %target.display(), "plugin files copied");

        if !self.scan().await {
            return Err(Error::message("rescan after install failed"));
        }
        Ok(descriptor.name)
    }

    /// Unload, delete managed files, and forget the plugin.
    pub async fn uninstall(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(descriptor) = state.plugins.get(name).cloned() else {
            warn!(plugin = name, error = %Error::unknown_plugin(name), "plugin uninstall failed");
            return false;
        };
        if report(name, "unload", self.unload_locked(&mut state, name).await).is_none() {
            return false;
        }

        if let Some(path) = descriptor.path {
            let root = self.options.install_dir.clone();
            let dir = path.clone();
            match tokio::task::spawn_blocking(move || remove_managed(&root, &dir)).await {
                Ok(Ok(true)) => debug!(plugin = name, path = %path.display(), "plugin files removed"),
                Ok(Ok(false)) => info!(
                    plugin = name,
                    path = %path.display(),
                    "plugin lives outside the install dir, leaving its files"
                ),
                Ok(Err(e)) => {
                    warn!(plugin = name, error = %e, "failed to remove plugin files");
                    return false;
                },
                Err(e) => {
                    warn!(plugin = name, error = %e, "plugin removal task failed");
                    return false;
                },
            }
        }

        state.plugins.remove(name);
        info!(plugin = name, "plugin uninstalled");
        self.persist(&state).await
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub async fn get_plugin(&self, name: &str) -> Option<PluginDescriptor> {
        self.state.lock().await.plugins.get(name).cloned()
    }

    /// Known plugins sorted by name, optionally restricted to one category.
    pub async fn list_plugins(&self, category: Option<&str>) -> Vec<PluginDescriptor> {
        self.state
            .lock()
            .await
            .plugins
            .values()
            .filter(|d| category.is_none_or(|c| d.category == c))
            .cloned()
            .collect()
    }

    pub fn list_commands(&self, category: Option<&str>) -> Vec<CommandBinding> {
        self.commands.list(category)
    }

    pub fn get_command_handler(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.handler(name)
    }

    async fn persist(&self, state: &State) -> bool {
        match self.catalogue.save(state.plugins.values().cloned().collect()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, path = %self.catalogue.path().display(), "failed to save plugin catalogue");
                false
            },
        }
    }
}

fn report<T>(name: &str, action: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e @ Error::Disabled { .. }) => {
            info!(plugin = name, action, reason = %e, "plugin operation skipped");
            None
        },
        Err(e) => {
            warn!(plugin = name, action, error = %e, "plugin operation failed");
            None
        },
    }
}

async fn run_cleanup(name: &str, instance: &dyn Plugin) {
    match instance.cleanup().await {
        Ok(true) => {},
        Ok(false) => warn!(plugin = name, "plugin cleanup reported failure"),
        Err(e) => warn!(plugin = name, error = %e, "plugin cleanup failed"),
    }
}
