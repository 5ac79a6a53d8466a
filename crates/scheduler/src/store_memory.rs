//! In-memory store for testing.

use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;

use crate::{Result, store::TaskStore, types::TaskRecord};

/// In-memory store backed by a map. No persistence, for tests only.
#[derive(Default)]
pub struct InMemoryStore {
    tasks: Mutex<BTreeMap<String, TaskRecord>>,
    saves: Mutex<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store as if a previous process had saved `tasks`.
    pub fn with_tasks(tasks: Vec<TaskRecord>) -> Self {
        let store = Self::new();
        *store.tasks.lock().unwrap_or_else(|e| e.into_inner()) =
            tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        store
    }

    /// Number of `save_all` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Vec<TaskRecord> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn load(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.snapshot())
    }

    async fn save_all(&self, tasks: &[TaskRecord]) -> Result<()> {
        let mut stored = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        *stored = tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::TaskSchedule, serde_json::Map};

    fn make_task(id: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            name: format!("task-{id}"),
            schedule: TaskSchedule::Interval { every_secs: 10 },
            start_at_ms: None,
            end_at_ms: None,
            max_executions: None,
            executed_count: 0,
            last_executed_at_ms: None,
            next_execution_at_ms: None,
            enabled: true,
            args: vec![],
            kwargs: Map::new(),
            owner: None,
            created_at_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = InMemoryStore::new();
        store
            .save_all(&[make_task("1"), make_task("2")])
            .await
            .unwrap();

        let tasks = store.load().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_save_all_replaces() {
        let store = InMemoryStore::with_tasks(vec![make_task("1")]);
        store.save_all(&[make_task("2")]).await.unwrap();
        let tasks = store.load().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "2");
    }
}
