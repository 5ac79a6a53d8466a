//! Interval, cron, and one-shot task scheduling.
//!
//! Task records persist at `<data_dir>/scheduler/tasks.json`; the callables
//! that run them live only in memory and are re-armed by their owners on
//! startup.

pub mod clock;
pub mod cron;
pub mod error;
pub mod service;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod types;

pub use {
    clock::{Clock, ManualClock, SystemClock},
    cron::{CronExpr, CronFieldSet, next_execution},
    error::{Error, Result},
    service::{Scheduler, SchedulerOptions, TickReport},
    store::TaskStore,
    store_file::FileStore,
    store_memory::InMemoryStore,
    types::{SchedulerStatus, TaskArgs, TaskFn, TaskRecord, TaskRequest, TaskSchedule, task_fn},
};
