//! JSON file-backed task store with atomic writes.

use std::{collections::BTreeMap, path::PathBuf};

use {async_trait::async_trait, tokio::fs, tracing::debug};

use crate::{Error, Result, store::TaskStore, types::TaskRecord};

/// File-backed store. All records in a single JSON object keyed by task id.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Atomic write: write to temp, keep `.bak`, rename over target.
    async fn atomic_write(&self, json: String) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, json.as_bytes()).await?;

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let bak = self.path.with_extension("json.bak");
            let _ = fs::rename(&self.path, &bak).await;
        }

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FileStore {
    async fn load(&self) -> Result<Vec<TaskRecord>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.path).await?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let tasks: BTreeMap<String, TaskRecord> = serde_json::from_str(&data)
            .map_err(|e| Error::external(format!("failed to parse {}", self.path.display()), e))?;
        debug!(count = tasks.len(), path = %self.path.display(), "loaded task records");
        Ok(tasks.into_values().collect())
    }

    async fn save_all(&self, tasks: &[TaskRecord]) -> Result<()> {
        let keyed: BTreeMap<&str, &TaskRecord> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let json = serde_json::to_string_pretty(&keyed)?;
        self.atomic_write(json).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::TaskSchedule,
        serde_json::{Map, json},
        tempfile::TempDir,
    };

    fn make_store(tmp: &TempDir) -> FileStore {
        FileStore::new(tmp.path().join("scheduler").join("tasks.json"))
    }

    fn make_task(id: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            name: format!("task-{id}"),
            schedule: TaskSchedule::Cron {
                expr: "0 * * * *".into(),
                tz: None,
            },
            start_at_ms: None,
            end_at_ms: None,
            max_executions: Some(3),
            executed_count: 1,
            last_executed_at_ms: Some(500),
            next_execution_at_ms: Some(3_600_000),
            enabled: true,
            args: vec![json!("hello")],
            kwargs: Map::new(),
            owner: Some("reminders".into()),
            created_at_ms: 100,
        }
    }

    #[tokio::test]
    async fn test_file_store_load_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(make_store(&tmp).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_keyed_by_id() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store
            .save_all(&[make_task("a"), make_task("b")])
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["a"]["name"], "task-a");
        assert_eq!(raw["b"]["executedCount"], 1);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], make_task("a"));
    }

    #[tokio::test]
    async fn test_file_store_backup_created() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        store.save_all(&[make_task("a")]).await.unwrap();
        store.save_all(&[]).await.unwrap();

        assert!(store.path().with_extension("json.bak").exists());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().await.is_err());
    }
}
