//! What a plugin receives when it is initialized.

use std::sync::{Arc, Mutex};

use {
    selfbot_events::{EventDispatcher, TransportAdapter},
    selfbot_scheduler::{Scheduler, TaskFn, TaskRecord, TaskRequest},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::commands::CommandRegistry;

/// A task scheduled through the handle and the record its id replaced.
type Scheduled = (String, Option<TaskRecord>);

/// Scheduler handle that stamps the plugin as owner of every task.
#[derive(Clone)]
pub struct PluginScheduler {
    inner: Arc<Scheduler>,
    owner: String,
    scheduled: Arc<Mutex<Vec<Scheduled>>>,
}

impl PluginScheduler {
    pub fn new(inner: Arc<Scheduler>, owner: impl Into<String>) -> Self {
        Self {
            inner,
            owner: owner.into(),
            scheduled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn schedule(&self, func: TaskFn, req: TaskRequest) -> selfbot_scheduler::Result<String> {
        let previous = self.previous(&req).await;
        let id = self.inner.schedule(func, req.owned_by(&self.owner)).await?;
        self.track(&id, previous);
        Ok(id)
    }

    pub async fn schedule_once(
        &self,
        func: TaskFn,
        when_ms: u64,
        name: Option<String>,
    ) -> selfbot_scheduler::Result<String> {
        let req = TaskRequest {
            name,
            ..Default::default()
        }
        .owned_by(&self.owner);
        let id = self.inner.schedule_at(func, when_ms, req).await?;
        self.track(&id, None);
        Ok(id)
    }

    /// Remove one of this plugin's tasks. Tasks of other owners are untouched.
    pub async fn unschedule(&self, id: &str) -> bool {
        match self.inner.get_task(id).await {
            Some(task) if task.owner.as_deref() == Some(self.owner.as_str()) => {
                self.inner.unschedule(id).await
            },
            _ => false,
        }
    }

    pub async fn list_tasks(&self) -> Vec<TaskRecord> {
        self.inner
            .list_tasks()
            .await
            .into_iter()
            .filter(|t| t.owner.as_deref() == Some(self.owner.as_str()))
            .collect()
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.now_ms()
    }

    async fn previous(&self, req: &TaskRequest) -> Option<TaskRecord> {
        match &req.id {
            Some(id) => self.inner.get_task(id).await,
            None => None,
        }
    }

    fn track(&self, id: &str, previous: Option<TaskRecord>) {
        self.scheduled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id.to_string(), previous));
    }

    /// Undo every task scheduled through this handle.
    ///
    /// New ids are unscheduled; a re-armed id gets its earlier record back,
    /// dormant. Returns how many ids were reverted.
    pub(crate) async fn rollback(&self) -> usize {
        let scheduled =
            std::mem::take(&mut *self.scheduled.lock().unwrap_or_else(|e| e.into_inner()));
        let mut removed = 0;
        for (id, previous) in scheduled.into_iter().rev() {
            match previous {
                Some(record) => {
                    self.inner.restore(record).await;
                    removed += 1;
                },
                None => {
                    if self.inner.unschedule(&id).await {
                        removed += 1;
                    }
                },
            }
        }
        if removed > 0 {
            debug!(plugin = %self.owner, removed, "rolled back scheduled tasks");
        }
        removed
    }
}

/// Handles given to [`crate::Plugin::initialize`]. Cheap to clone and keep.
#[derive(Clone)]
pub struct PluginContext {
    pub name: String,
    pub config: Map<String, Value>,
    pub scheduler: PluginScheduler,
    pub commands: Arc<CommandRegistry>,
    dispatcher: Arc<EventDispatcher>,
}

impl PluginContext {
    pub fn new(
        name: impl Into<String>,
        config: Map<String, Value>,
        scheduler: PluginScheduler,
        commands: Arc<CommandRegistry>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            scheduler,
            commands,
            dispatcher,
        }
    }

    /// The live transport, once one is attached.
    pub fn transport(&self) -> Option<Arc<dyn TransportAdapter>> {
        self.dispatcher.transport()
    }

    /// Read a config value, falling back to `default` when absent or mistyped.
    pub fn config_or<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        selfbot_scheduler::{InMemoryStore, task_fn},
        serde_json::json,
    };

    async fn idle(_args: selfbot_scheduler::TaskArgs) -> anyhow::Result<()> {
        Ok(())
    }

    fn scheduler() -> Arc<Scheduler> {
        Scheduler::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn tasks_are_owned_and_isolated() {
        let inner = scheduler();
        let weather = PluginScheduler::new(Arc::clone(&inner), "weather");
        let notes = PluginScheduler::new(Arc::clone(&inner), "notes");

        let id = weather
            .schedule(task_fn(idle), TaskRequest::interval(60))
            .await
            .unwrap();
        notes
            .schedule_once(task_fn(idle), inner.now_ms() + 60_000, Some("remind".into()))
            .await
            .unwrap();

        assert_eq!(inner.get_task(&id).await.unwrap().owner.as_deref(), Some("weather"));
        assert_eq!(weather.list_tasks().await.len(), 1);
        assert!(!notes.unschedule(&id).await);
        assert!(weather.unschedule(&id).await);
        assert_eq!(inner.list_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn rollback_removes_only_tracked_tasks() {
        let inner = scheduler();
        let first = PluginScheduler::new(Arc::clone(&inner), "weather");
        first
            .schedule(task_fn(idle), TaskRequest::interval(60))
            .await
            .unwrap();

        let second = PluginScheduler::new(Arc::clone(&inner), "weather");
        second
            .schedule(task_fn(idle), TaskRequest::interval(30))
            .await
            .unwrap();
        assert_eq!(second.rollback().await, 1);
        assert_eq!(second.rollback().await, 0);
        assert_eq!(inner.list_tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn rollback_restores_a_rearmed_record() {
        let inner = scheduler();
        let earlier = PluginScheduler::new(Arc::clone(&inner), "weather");
        let req = || TaskRequest {
            id: Some("weather-hourly".into()),
            ..TaskRequest::interval(3_600)
        };
        earlier.schedule(task_fn(idle), req()).await.unwrap();
        let mut record = inner.get_task("weather-hourly").await.unwrap();
        record.executed_count = 7;
        inner.restore(record).await;
        assert!(!inner.is_armed("weather-hourly").await);

        let retry = PluginScheduler::new(Arc::clone(&inner), "weather");
        retry.schedule(task_fn(idle), req()).await.unwrap();
        retry.schedule(task_fn(idle), req()).await.unwrap();
        assert!(inner.is_armed("weather-hourly").await);

        assert_eq!(retry.rollback().await, 2);
        let task = inner.get_task("weather-hourly").await.unwrap();
        assert_eq!(task.executed_count, 7);
        assert!(!inner.is_armed("weather-hourly").await);
    }

    #[test]
    fn config_or_falls_back() {
        let mut config = Map::new();
        config.insert("limit".into(), json!(5));
        config.insert("name".into(), json!(7));
        let ctx = PluginContext::new(
            "p",
            config,
            PluginScheduler::new(scheduler(), "p"),
            Arc::new(CommandRegistry::new()),
            Arc::new(EventDispatcher::new()),
        );
        assert_eq!(ctx.config_or("limit", 1u32), 5);
        assert_eq!(ctx.config_or("name", "x".to_string()), "x");
        assert!(ctx.config_or("missing", true));
        assert!(ctx.transport().is_none());
    }
}
