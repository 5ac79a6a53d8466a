//! Explicit wiring of the dispatcher, scheduler, and plugin manager.
//!
//! Every service is built once by [`RuntimeBuilder::build`] and handed to the
//! components that need it. Nothing is looked up globally.

pub mod error;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    selfbot_config::SelfbotConfig,
    selfbot_events::{
        EventDispatcher, LoggingMiddleware, Middleware, RateLimitMiddleware, TransportAdapter,
    },
    selfbot_plugins::{
        CommandRegistry, CommandRouter, ManagerOptions, Plugin, PluginManager, PluginRegistry,
        bundled,
    },
    selfbot_scheduler::{
        Clock, FileStore, Scheduler, SchedulerOptions, SystemClock, TaskStore, cron::parse_timezone,
    },
    tracing::{info, warn},
};

pub use error::{Error, Result};

/// Collects the optional pieces before the services are built.
pub struct RuntimeBuilder {
    config: SelfbotConfig,
    registry: PluginRegistry,
    transport: Option<Arc<dyn TransportAdapter>>,
    store: Option<Arc<dyn TaskStore>>,
    clock: Option<Arc<dyn Clock>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl RuntimeBuilder {
    pub fn new(config: SelfbotConfig) -> Self {
        let mut registry = PluginRegistry::new();
        bundled::register_bundled(&mut registry);
        Self {
            config,
            registry,
            transport: None,
            store: None,
            clock: None,
            middleware: Vec::new(),
        }
    }

    /// Make a compiled plugin available under `module`.
    #[must_use]
    pub fn plugin<F>(mut self, module: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.registry.register_fn(module, factory);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn TransportAdapter>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the task store. Defaults to a [`FileStore`] at the configured path.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Add a host middleware after the configured ones.
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> Result<Runtime> {
        let config = self.config;

        let dispatcher = Arc::new(EventDispatcher::new());
        let rate_limit = &config.middleware.rate_limit;
        if rate_limit.enabled {
            dispatcher.register_middleware(Arc::new(RateLimitMiddleware::new(
                rate_limit.max_events as usize,
                Duration::from_secs(rate_limit.window_secs),
            )));
        }
        if config.middleware.log_events {
            dispatcher.register_middleware(Arc::new(LoggingMiddleware));
        }
        for middleware in self.middleware {
            dispatcher.register_middleware(middleware);
        }

        let mut options = SchedulerOptions {
            tick_interval: Duration::from_millis(config.scheduler.tick_interval_ms.max(1)),
            ..Default::default()
        };
        if let Some(tz) = &config.scheduler.timezone {
            options.default_timezone = parse_timezone(tz)?;
        }
        let store = self.store.unwrap_or_else(|| {
            Arc::new(FileStore::new(config.scheduler.resolved_store_path())) as Arc<dyn TaskStore>
        });
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let scheduler = Scheduler::with_options(store, clock, options);

        let commands = Arc::new(CommandRegistry::new());
        CommandRouter::install(
            &dispatcher,
            Arc::clone(&commands),
            config.runtime.command_prefix.as_str(),
        );

        let plugins = Arc::new(PluginManager::new(
            ManagerOptions::from_config(&config.plugins),
            self.registry,
            Arc::clone(&dispatcher),
            Arc::clone(&scheduler),
            Arc::clone(&commands),
        ));

        Ok(Runtime {
            config,
            dispatcher,
            scheduler,
            commands,
            plugins,
            transport: self.transport,
            started: AtomicBool::new(false),
        })
    }
}

/// The running automation core.
pub struct Runtime {
    config: SelfbotConfig,
    dispatcher: Arc<EventDispatcher>,
    scheduler: Arc<Scheduler>,
    commands: Arc<CommandRegistry>,
    plugins: Arc<PluginManager>,
    transport: Option<Arc<dyn TransportAdapter>>,
    started: AtomicBool,
}

impl Runtime {
    pub fn builder(config: SelfbotConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &SelfbotConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    /// Start the scheduler, load plugins, then bind and connect the transport.
    ///
    /// The transport is attached before plugins load so `initialize` can
    /// already reach it; it connects only once every plugin is registered.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("runtime already started");
            return Ok(());
        }

        if let Err(e) = self.scheduler.start().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        if let Some(transport) = &self.transport {
            self.dispatcher.attach_transport(Arc::clone(transport));
        }

        if !self.plugins.scan().await {
            warn!("plugin scan did not complete cleanly");
        }
        for descriptor in bundled::bundled_descriptors(&self.config.runtime.command_prefix) {
            self.plugins.register_builtin(descriptor).await;
        }
        if self.config.plugins.autoload && !self.plugins.load_all().await {
            warn!("some enabled plugins failed to load");
        }

        if let Some(transport) = &self.transport {
            transport
                .connect()
                .await
                .map_err(|e| Error::transport(transport.name(), "connect", &e))?;
        }

        info!(
            plugins = self.plugins.list_plugins(None).await.len(),
            commands = self.commands.len(),
            subscriptions = self.dispatcher.subscriptions().len(),
            "runtime started"
        );
        Ok(())
    }

    /// Clean up plugins, stop the scheduler, and disconnect.
    ///
    /// Scheduled task records stay persisted for the next start.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.plugins.shutdown().await;
        self.scheduler.stop().await;
        if let Some(transport) = &self.transport {
            transport
                .disconnect()
                .await
                .map_err(|e| Error::transport(transport.name(), "disconnect", &e))?;
        }
        info!("runtime stopped");
        Ok(())
    }
}
