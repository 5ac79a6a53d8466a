//! Core data types for the task scheduler.

use std::{future::Future, sync::Arc};

use {
    futures::future::BoxFuture,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// How a task is scheduled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaskSchedule {
    /// Fire every `every_secs` seconds.
    Interval { every_secs: u64 },
    /// Fire on every minute matching a five-field cron expression.
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
    /// Fire once at the task's start time.
    Once,
}

impl TaskSchedule {
    pub fn is_once(&self) -> bool {
        matches!(self, Self::Once)
    }
}

fn default_true() -> bool {
    true
}

/// The durable part of a scheduled task. The callable lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    pub schedule: TaskSchedule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_executions: Option<u32>,
    #[serde(default)]
    pub executed_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_execution_at_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub kwargs: Map<String, Value>,
    /// Plugin that scheduled the task, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub created_at_ms: u64,
}

impl TaskRecord {
    /// `executed_count` has reached `max_executions`.
    pub fn is_exhausted(&self) -> bool {
        self.max_executions
            .is_some_and(|max| self.executed_count >= max)
    }

    /// `end_at_ms` lies strictly before `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.end_at_ms.is_some_and(|end| now_ms > end)
    }

    pub fn has_started(&self, now_ms: u64) -> bool {
        self.start_at_ms.is_none_or(|start| start <= now_ms)
    }
}

/// Arguments handed to a task callable on every run.
#[derive(Debug, Clone, Default)]
pub struct TaskArgs {
    pub task_id: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

/// Callback run on every firing. Errors are logged by the scheduler.
pub type TaskFn = Arc<dyn Fn(TaskArgs) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn(TaskArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |args| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(args)) })
}

/// Input for [`crate::Scheduler::schedule`].
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    /// Explicit id; reusing a persisted id re-arms that record.
    pub id: Option<String>,
    pub name: Option<String>,
    pub interval_secs: Option<u64>,
    pub cron: Option<String>,
    /// Timezone for `cron`; falls back to the scheduler default.
    pub timezone: Option<String>,
    pub start_at_ms: Option<u64>,
    pub end_at_ms: Option<u64>,
    pub max_executions: Option<u32>,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub owner: Option<String>,
}

impl TaskRequest {
    pub fn interval(every_secs: u64) -> Self {
        Self {
            interval_secs: Some(every_secs),
            ..Default::default()
        }
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        Self {
            cron: Some(expr.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn in_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = Some(tz.into());
        self
    }

    #[must_use]
    pub fn starting_at(mut self, start_at_ms: u64) -> Self {
        self.start_at_ms = Some(start_at_ms);
        self
    }

    #[must_use]
    pub fn ending_at(mut self, end_at_ms: u64) -> Self {
        self.end_at_ms = Some(end_at_ms);
        self
    }

    #[must_use]
    pub fn max_executions(mut self, max: u32) -> Self {
        self.max_executions = Some(max);
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Scheduler summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub task_count: usize,
    pub enabled_count: usize,
    /// Tasks with a callable attached; the rest are persisted but dormant.
    pub armed_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_execution_at_ms: Option<u64>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn record(schedule: TaskSchedule) -> TaskRecord {
        TaskRecord {
            id: "t1".into(),
            name: "ping".into(),
            schedule,
            start_at_ms: None,
            end_at_ms: None,
            max_executions: None,
            executed_count: 0,
            last_executed_at_ms: None,
            next_execution_at_ms: Some(60_000),
            enabled: true,
            args: vec![],
            kwargs: Map::new(),
            owner: None,
            created_at_ms: 0,
        }
    }

    #[test]
    fn schedule_is_tagged_by_kind() {
        let json = serde_json::to_value(TaskSchedule::Cron {
            expr: "*/5 * * * *".into(),
            tz: None,
        })
        .unwrap();
        assert_eq!(json["kind"], "cron");
        assert_eq!(json["expr"], "*/5 * * * *");
        assert!(json.get("tz").is_none());

        let once = serde_json::to_value(TaskSchedule::Once).unwrap();
        assert_eq!(once, serde_json::json!({"kind": "once"}));
    }

    #[test]
    fn record_serializes_camel_case_and_skips_empty() {
        let json = serde_json::to_value(record(TaskSchedule::Interval { every_secs: 30 })).unwrap();
        assert_eq!(json["nextExecutionAtMs"], 60_000);
        assert_eq!(json["executedCount"], 0);
        assert!(json.get("args").is_none());
        assert!(json.get("owner").is_none());
    }

    #[test]
    fn missing_enabled_defaults_to_true() {
        let parsed: TaskRecord = serde_json::from_value(serde_json::json!({
            "id": "x",
            "name": "x",
            "schedule": {"kind": "interval", "every_secs": 5}
        }))
        .unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.executed_count, 0);
    }

    #[test]
    fn exhaustion_and_expiry() {
        let mut r = record(TaskSchedule::Once);
        assert!(!r.is_exhausted());
        r.max_executions = Some(1);
        r.executed_count = 1;
        assert!(r.is_exhausted());

        r.end_at_ms = Some(100);
        assert!(!r.is_expired(100));
        assert!(r.is_expired(101));

        r.start_at_ms = Some(50);
        assert!(!r.has_started(49));
        assert!(r.has_started(50));
    }
}
