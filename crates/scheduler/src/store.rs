//! Persistence trait for task records.

use async_trait::async_trait;

use crate::{Result, types::TaskRecord};

/// Persistence backend for the task registry.
///
/// Only records are stored; callables are never persisted.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn load(&self) -> Result<Vec<TaskRecord>>;
    /// Replace the persisted registry with `tasks`.
    async fn save_all(&self, tasks: &[TaskRecord]) -> Result<()>;
}
