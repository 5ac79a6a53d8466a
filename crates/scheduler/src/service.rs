//! The scheduler: task registry, tick loop, and CRUD operations.

use std::{
    collections::{BTreeMap, HashMap},
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

use {
    chrono_tz::Tz,
    futures::FutureExt,
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    Error, Result,
    clock::{Clock, SystemClock},
    cron::CronExpr,
    store::TaskStore,
    types::*,
};

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// How often the loop wakes to look for due tasks.
    pub tick_interval: Duration,
    /// Timezone for cron tasks that do not name one.
    pub default_timezone: Tz,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            default_timezone: Tz::UTC,
        }
    }
}

/// Outcome of one pass over the registry.
#[derive(Debug, Default)]
pub struct TickReport {
    pub fired: Vec<String>,
    pub removed: Vec<String>,
    /// Handles of the spawned runs. Dropping them detaches the runs.
    pub handles: Vec<JoinHandle<()>>,
}

impl TickReport {
    /// Wait for every run spawned by this tick.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[derive(Default)]
struct Registry {
    records: BTreeMap<String, TaskRecord>,
    callables: HashMap<String, TaskFn>,
}

/// The task scheduler.
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    registry: RwLock<Registry>,
    persist_lock: Mutex<()>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    stop_notify: Arc<Notify>,
    running: RwLock<bool>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn TaskStore>) -> Arc<Self> {
        Self::with_options(store, Arc::new(SystemClock), SchedulerOptions::default())
    }

    /// Create a scheduler with an explicit clock and options.
    pub fn with_options(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        options: SchedulerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            options,
            registry: RwLock::new(Registry::default()),
            persist_lock: Mutex::new(()),
            timer_handle: Mutex::new(None),
            stop_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Restore persisted records and start the tick loop.
    ///
    /// Restored records stay dormant until their owner schedules the same id
    /// again. Records already registered in memory win over persisted ones.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut running = self.running.write().await;
        if *running {
            warn!("scheduler already running");
            return Ok(());
        }

        let loaded = self.store.load().await?;
        let mut restored = 0usize;
        {
            let mut reg = self.registry.write().await;
            for record in loaded {
                if !reg.records.contains_key(&record.id) {
                    reg.records.insert(record.id.clone(), record);
                    restored += 1;
                }
            }
        }
        info!(count = restored, "restored task records");

        *running = true;
        drop(running);

        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            svc.timer_loop().await;
        });
        *self.timer_handle.lock().await = Some(handle);
        info!(tick_ms = self.options.tick_interval.as_millis() as u64, "scheduler started");
        Ok(())
    }

    /// Stop the tick loop. Runs already spawned keep going.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.stop_notify.notify_one();

        if let Some(handle) = self.timer_handle.lock().await.take() {
            handle.abort();
        }
        self.persist().await;
        info!("scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Register a recurring task. Exactly one of interval or cron must be set.
    pub async fn schedule(&self, func: TaskFn, req: TaskRequest) -> Result<String> {
        let schedule = match (req.interval_secs, &req.cron) {
            (None, None) => {
                return Err(Error::validation(
                    "either an interval or a cron expression is required",
                ));
            },
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    "interval and cron expression are mutually exclusive",
                ));
            },
            (Some(0), None) => return Err(Error::validation("interval must be > 0")),
            (Some(every_secs), None) => TaskSchedule::Interval { every_secs },
            (None, Some(expr)) => {
                self.cron_for(expr, req.timezone.as_deref())?;
                TaskSchedule::Cron {
                    expr: expr.trim().to_string(),
                    tz: req.timezone.clone(),
                }
            },
        };
        self.register(func, req, schedule).await
    }

    /// Register a task that fires once at `when_ms`.
    pub async fn schedule_once(
        &self,
        func: TaskFn,
        when_ms: u64,
        name: Option<String>,
    ) -> Result<String> {
        let req = TaskRequest {
            name,
            ..Default::default()
        };
        self.schedule_at(func, when_ms, req).await
    }

    /// [`Self::schedule_once`] with the remaining request fields (id, owner,
    /// arguments). Interval and cron fields must be unset.
    pub async fn schedule_at(
        &self,
        func: TaskFn,
        when_ms: u64,
        mut req: TaskRequest,
    ) -> Result<String> {
        if req.interval_secs.is_some() || req.cron.is_some() {
            return Err(Error::validation(
                "a one-shot task cannot also have an interval or cron expression",
            ));
        }
        req.start_at_ms = Some(when_ms);
        req.max_executions = Some(1);
        self.register(func, req, TaskSchedule::Once).await
    }

    async fn register(
        &self,
        func: TaskFn,
        req: TaskRequest,
        schedule: TaskSchedule,
    ) -> Result<String> {
        if let (Some(start), Some(end)) = (req.start_at_ms, req.end_at_ms)
            && end < start
        {
            return Err(Error::validation("end time precedes start time"));
        }
        if req.max_executions == Some(0) {
            return Err(Error::validation("max_executions must be > 0"));
        }

        let now = self.clock.now_ms();
        let id = req
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut record = TaskRecord {
            name: req.name.unwrap_or_else(|| id.clone()),
            id: id.clone(),
            schedule,
            start_at_ms: req.start_at_ms,
            end_at_ms: req.end_at_ms,
            max_executions: req.max_executions,
            executed_count: 0,
            last_executed_at_ms: None,
            next_execution_at_ms: None,
            enabled: true,
            args: req.args,
            kwargs: req.kwargs,
            owner: req.owner,
            created_at_ms: now,
        };
        record.next_execution_at_ms = Some(self.first_run(&record, now)?);

        {
            let mut reg = self.registry.write().await;
            if let Some(previous) = reg.records.get(&id) {
                debug!(task_id = %id, executed = previous.executed_count, "re-arming task");
                record.executed_count = previous.executed_count;
                record.last_executed_at_ms = previous.last_executed_at_ms;
                record.created_at_ms = previous.created_at_ms;
                record.enabled = previous.enabled;
            }
            info!(
                task_id = %id,
                name = %record.name,
                next_ms = ?record.next_execution_at_ms,
                "task scheduled"
            );
            reg.records.insert(id.clone(), record);
            reg.callables.insert(id.clone(), func);
        }

        self.persist().await;
        Ok(id)
    }

    /// Remove a task. Returns false if it was not registered.
    pub async fn unschedule(&self, id: &str) -> bool {
        let removed = {
            let mut reg = self.registry.write().await;
            reg.callables.remove(id);
            reg.records.remove(id).is_some()
        };
        if removed {
            self.persist().await;
            info!(task_id = %id, "task unscheduled");
        }
        removed
    }

    /// Put `record` back as a dormant task, replacing whatever holds its id.
    ///
    /// Any callable attached to the id is dropped; the owner re-arms it later.
    pub async fn restore(&self, record: TaskRecord) {
        {
            let mut reg = self.registry.write().await;
            reg.callables.remove(&record.id);
            debug!(task_id = %record.id, executed = record.executed_count, "task record restored");
            reg.records.insert(record.id.clone(), record);
        }
        self.persist().await;
    }

    /// Remove every task owned by `owner`. Returns how many were removed.
    pub async fn unschedule_owner(&self, owner: &str) -> usize {
        let removed: Vec<String> = {
            let mut reg = self.registry.write().await;
            let ids: Vec<String> = reg
                .records
                .values()
                .filter(|r| r.owner.as_deref() == Some(owner))
                .map(|r| r.id.clone())
                .collect();
            for id in &ids {
                reg.records.remove(id);
                reg.callables.remove(id);
            }
            ids
        };
        if !removed.is_empty() {
            self.persist().await;
            info!(owner, count = removed.len(), "owner tasks unscheduled");
        }
        removed.len()
    }

    pub async fn pause(&self, id: &str) -> bool {
        self.set_enabled(id, false).await
    }

    pub async fn resume(&self, id: &str) -> bool {
        self.set_enabled(id, true).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let found = {
            let mut reg = self.registry.write().await;
            match reg.records.get_mut(id) {
                Some(record) => {
                    record.enabled = enabled;
                    true
                },
                None => false,
            }
        };
        if found {
            self.persist().await;
            debug!(task_id = %id, enabled, "task toggled");
        }
        found
    }

    pub async fn get_task(&self, id: &str) -> Option<TaskRecord> {
        self.registry.read().await.records.get(id).cloned()
    }

    /// All records, oldest first.
    pub async fn list_tasks(&self) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> =
            self.registry.read().await.records.values().cloned().collect();
        tasks.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    /// Whether a callable is attached to `id`.
    pub async fn is_armed(&self, id: &str) -> bool {
        self.registry.read().await.callables.contains_key(id)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let running = *self.running.read().await;
        let reg = self.registry.read().await;
        SchedulerStatus {
            running,
            task_count: reg.records.len(),
            enabled_count: reg.records.values().filter(|r| r.enabled).count(),
            armed_count: reg.callables.len(),
            next_execution_at_ms: reg
                .records
                .iter()
                .filter(|(id, r)| r.enabled && reg.callables.contains_key(*id))
                .filter_map(|(_, r)| r.next_execution_at_ms)
                .min(),
        }
    }

    /// Run one pass over the registry at the clock's current time.
    ///
    /// Due tasks are spawned, not awaited. The registry is persisted when the
    /// pass changed anything.
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now_ms();
        let mut report = TickReport::default();

        {
            let mut guard = self.registry.write().await;
            let Registry { records, callables } = &mut *guard;
            let ids: Vec<String> = records.keys().cloned().collect();

            for id in ids {
                let Some(record) = records.get_mut(&id) else {
                    continue;
                };
                if !record.enabled || !record.has_started(now) {
                    continue;
                }
                if record.is_expired(now) || record.is_exhausted() {
                    records.remove(&id);
                    callables.remove(&id);
                    debug!(task_id = %id, "task finished");
                    report.removed.push(id);
                    continue;
                }
                if record.next_execution_at_ms.is_some_and(|next| next > now) {
                    continue;
                }
                let Some(callable) = callables.get(&id).cloned() else {
                    // Dormant: persisted but not re-armed by its owner yet.
                    continue;
                };

                let args = TaskArgs {
                    task_id: id.clone(),
                    args: record.args.clone(),
                    kwargs: record.kwargs.clone(),
                };
                report
                    .handles
                    .push(spawn_run(id.clone(), record.name.clone(), callable, args));
                record.executed_count = record.executed_count.saturating_add(1);
                record.last_executed_at_ms = Some(now);

                match self.next_run_after_fire(record, now) {
                    Ok(Some(next)) => record.next_execution_at_ms = Some(next),
                    Ok(None) => {
                        records.remove(&id);
                        callables.remove(&id);
                        report.removed.push(id.clone());
                    },
                    Err(e) => {
                        warn!(task_id = %id, error = %e, "cannot compute next run, pausing task");
                        record.enabled = false;
                        record.next_execution_at_ms = None;
                    },
                }
                report.fired.push(id);
            }
        }

        if !report.fired.is_empty() || !report.removed.is_empty() {
            self.persist().await;
        }
        report
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            let notify = Arc::clone(&self.stop_notify);
            tokio::select! {
                () = tokio::time::sleep(self.options.tick_interval) => {},
                () = notify.notified() => {
                    debug!("tick loop woken by stop");
                },
            }

            if !*self.running.read().await {
                break;
            }

            let report = self.tick().await;
            if !report.fired.is_empty() {
                debug!(count = report.fired.len(), "tasks dispatched");
            }
        }
    }

    fn cron_for(&self, expr: &str, tz: Option<&str>) -> Result<CronExpr> {
        match tz {
            Some(_) => CronExpr::parse(expr, tz),
            None => CronExpr::with_timezone(expr, self.options.default_timezone),
        }
    }

    /// First firing time; never earlier than the task's start.
    fn first_run(&self, record: &TaskRecord, now: u64) -> Result<u64> {
        let start = record.start_at_ms.unwrap_or(now);
        match &record.schedule {
            TaskSchedule::Interval { .. } | TaskSchedule::Once => Ok(start.max(now)),
            TaskSchedule::Cron { expr, tz } => {
                let cron = self.cron_for(expr, tz.as_deref())?;
                // The scan begins one minute after its base, so back off 1ms to
                // allow a match exactly at `start`.
                let base = if start > now {
                    start - 1
                } else {
                    now
                };
                Ok(cron.next_after_ms(base))
            },
        }
    }

    fn next_run_after_fire(&self, record: &TaskRecord, now: u64) -> Result<Option<u64>> {
        match &record.schedule {
            TaskSchedule::Interval { every_secs } => {
                Ok(Some(now.saturating_add(every_secs.saturating_mul(1_000))))
            },
            TaskSchedule::Cron { expr, tz } => {
                Ok(Some(self.cron_for(expr, tz.as_deref())?.next_after_ms(now)))
            },
            TaskSchedule::Once => Ok(None),
        }
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot: Vec<TaskRecord> =
            self.registry.read().await.records.values().cloned().collect();
        if let Err(e) = self.store.save_all(&snapshot).await {
            warn!(error = %e, "failed to persist task registry");
        }
    }
}

fn spawn_run(id: String, name: String, callable: TaskFn, args: TaskArgs) -> JoinHandle<()> {
    let fut = callable(args);
    tokio::spawn(async move {
        debug!(task_id = %id, name = %name, "running task");
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => error!(task_id = %id, name = %name, error = %e, "scheduled task failed"),
            Err(_) => error!(task_id = %id, name = %name, "scheduled task panicked"),
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use {
        super::*,
        crate::{clock::ManualClock, store_memory::InMemoryStore},
        chrono::{DateTime, Utc},
        serde_json::json,
    };

    const MINUTE_MS: u64 = 60_000;

    fn ms(s: &str) -> u64 {
        s.parse::<DateTime<Utc>>().unwrap().timestamp_millis() as u64
    }

    fn counting(counter: Arc<AtomicUsize>) -> TaskFn {
        task_fn(move |_args| {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        })
    }

    async fn idle(_args: TaskArgs) -> anyhow::Result<()> {
        Ok(())
    }

    async fn failing(_args: TaskArgs) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    async fn panicking(_args: TaskArgs) -> anyhow::Result<()> {
        panic!("worse")
    }

    fn noop() -> TaskFn {
        task_fn(idle)
    }

    fn make_svc(store: Arc<InMemoryStore>, clock: Arc<ManualClock>) -> Arc<Scheduler> {
        Scheduler::with_options(store, clock, SchedulerOptions::default())
    }

    fn setup(now_ms: u64) -> (Arc<Scheduler>, Arc<InMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(now_ms));
        (make_svc(Arc::clone(&store), Arc::clone(&clock)), store, clock)
    }

    #[tokio::test]
    async fn test_validation_rejects_before_registering() {
        let (svc, store, _) = setup(0);

        let err = svc.schedule(noop(), TaskRequest::default()).await.unwrap_err();
        assert!(err.is_validation());
        let both = TaskRequest {
            interval_secs: Some(5),
            cron: Some("* * * * *".into()),
            ..Default::default()
        };
        assert!(svc.schedule(noop(), both).await.unwrap_err().is_validation());
        assert!(
            svc.schedule(noop(), TaskRequest::interval(0))
                .await
                .unwrap_err()
                .is_validation()
        );
        assert!(
            svc.schedule(noop(), TaskRequest::cron("61 * * * *"))
                .await
                .unwrap_err()
                .is_validation()
        );
        assert!(
            svc.schedule(noop(), TaskRequest::cron("* * * * *").in_timezone("Mars/Base"))
                .await
                .unwrap_err()
                .is_validation()
        );
        assert!(
            svc.schedule(
                noop(),
                TaskRequest::interval(5).starting_at(10).ending_at(5)
            )
            .await
            .unwrap_err()
            .is_validation()
        );

        assert!(svc.list_tasks().await.is_empty());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_cron_every_minute_scenario() {
        let t = ms("2024-03-10T10:00:20Z");
        let (svc, _, clock) = setup(t);
        let counter = Arc::new(AtomicUsize::new(0));

        let id = svc
            .schedule(counting(Arc::clone(&counter)), TaskRequest::cron("* * * * *"))
            .await
            .unwrap();
        let first = ms("2024-03-10T10:01:00Z");
        assert_eq!(svc.get_task(&id).await.unwrap().next_execution_at_ms, Some(first));

        clock.set(ms("2024-03-10T10:00:59Z"));
        assert!(svc.tick().await.fired.is_empty());

        clock.set(first + 400);
        svc.tick().await.join().await;
        let task = svc.get_task(&id).await.unwrap();
        assert_eq!(task.executed_count, 1);
        assert_eq!(task.next_execution_at_ms, Some(first + MINUTE_MS));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interval_gaps_at_least_interval() {
        let start = 1_000_000;
        let (svc, _, clock) = setup(start);
        let id = svc.schedule(noop(), TaskRequest::interval(5)).await.unwrap();

        let mut fired_at = Vec::new();
        for _ in 0..30 {
            if svc.tick().await.fired.contains(&id) {
                fired_at.push(clock.now_ms());
            }
            clock.advance_secs(1);
        }

        assert_eq!(fired_at.first(), Some(&start));
        assert!(fired_at.len() >= 5);
        for pair in fired_at.windows(2) {
            let gap = pair[1] - pair[0];
            assert!((5_000..=6_000).contains(&gap), "gap {gap}");
        }
    }

    #[tokio::test]
    async fn test_interval_with_future_start_waits() {
        let (svc, _, clock) = setup(0);
        let id = svc
            .schedule(noop(), TaskRequest::interval(1).starting_at(10_000))
            .await
            .unwrap();
        assert_eq!(svc.get_task(&id).await.unwrap().next_execution_at_ms, Some(10_000));

        clock.set(9_999);
        assert!(svc.tick().await.fired.is_empty());
        clock.set(10_000);
        assert_eq!(svc.tick().await.fired, vec![id]);
    }

    #[tokio::test]
    async fn test_cron_next_never_before_start() {
        let now = ms("2024-03-10T10:00:00Z");
        let (svc, _, _) = setup(now);
        let start = ms("2024-03-10T12:00:00Z");
        let id = svc
            .schedule(noop(), TaskRequest::cron("0 * * * *").starting_at(start))
            .await
            .unwrap();
        assert_eq!(svc.get_task(&id).await.unwrap().next_execution_at_ms, Some(start));

        let mid = ms("2024-03-10T12:00:30Z");
        let id2 = svc
            .schedule(noop(), TaskRequest::cron("* * * * *").starting_at(mid))
            .await
            .unwrap();
        let next = svc.get_task(&id2).await.unwrap().next_execution_at_ms.unwrap();
        assert!(next >= mid);
        assert_eq!(next, ms("2024-03-10T12:01:00Z"));
    }

    #[tokio::test]
    async fn test_one_shot_fires_once_and_is_removed() {
        let (svc, _, clock) = setup(0);
        let counter = Arc::new(AtomicUsize::new(0));
        let id = svc
            .schedule_once(counting(Arc::clone(&counter)), 5_000, Some("reminder".into()))
            .await
            .unwrap();
        let task = svc.get_task(&id).await.unwrap();
        assert_eq!(task.name, "reminder");
        assert_eq!(task.max_executions, Some(1));
        assert!(task.schedule.is_once());

        assert!(svc.tick().await.fired.is_empty());
        clock.set(5_000);
        let report = svc.tick().await;
        assert_eq!(report.fired, vec![id.clone()]);
        assert_eq!(report.removed, vec![id.clone()]);
        report.join().await;

        clock.set(10_000);
        assert!(svc.tick().await.fired.is_empty());
        assert!(svc.get_task(&id).await.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_executions_removes_on_following_tick() {
        let (svc, _, clock) = setup(0);
        let id = svc
            .schedule(noop(), TaskRequest::interval(1).max_executions(2))
            .await
            .unwrap();

        assert_eq!(svc.tick().await.fired.len(), 1);
        clock.advance_secs(1);
        assert_eq!(svc.tick().await.fired.len(), 1);
        clock.advance_secs(1);
        let report = svc.tick().await;
        assert!(report.fired.is_empty());
        assert_eq!(report.removed, vec![id]);
        assert!(svc.list_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_end_time_removes_task() {
        let (svc, _, clock) = setup(0);
        let id = svc
            .schedule(noop(), TaskRequest::interval(1).ending_at(2_000))
            .await
            .unwrap();
        svc.tick().await;
        clock.set(2_000);
        assert_eq!(svc.tick().await.fired, vec![id.clone()]);
        clock.set(2_001);
        assert_eq!(svc.tick().await.removed, vec![id]);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (svc, _, clock) = setup(0);
        let id = svc.schedule(noop(), TaskRequest::interval(1)).await.unwrap();
        assert!(svc.pause(&id).await);
        assert!(svc.tick().await.fired.is_empty());
        assert!(!svc.get_task(&id).await.unwrap().enabled);

        assert!(svc.resume(&id).await);
        clock.advance_secs(1);
        assert_eq!(svc.tick().await.fired, vec![id]);
        assert!(!svc.pause("missing").await);
    }

    #[tokio::test]
    async fn test_unschedule_and_owner_cleanup() {
        let (svc, _, _) = setup(0);
        let a = svc
            .schedule(noop(), TaskRequest::interval(5).owned_by("weather"))
            .await
            .unwrap();
        svc.schedule(noop(), TaskRequest::interval(5).owned_by("weather"))
            .await
            .unwrap();
        let other = svc
            .schedule(noop(), TaskRequest::interval(5).owned_by("notes"))
            .await
            .unwrap();

        assert!(svc.unschedule(&a).await);
        assert!(!svc.unschedule(&a).await);
        assert_eq!(svc.unschedule_owner("weather").await, 1);
        assert_eq!(svc.unschedule_owner("weather").await, 0);
        let remaining: Vec<String> = svc.list_tasks().await.into_iter().map(|t| t.id).collect();
        assert_eq!(remaining, vec![other]);
    }

    #[tokio::test]
    async fn test_failing_task_does_not_stop_others() {
        let (svc, _, _) = setup(0);
        let counter = Arc::new(AtomicUsize::new(0));
        svc.schedule(
            task_fn(failing),
            TaskRequest::interval(1).with_id("a-failing"),
        )
        .await
        .unwrap();
        svc.schedule(
            task_fn(panicking),
            TaskRequest::interval(1).with_id("b-panicking"),
        )
        .await
        .unwrap();
        svc.schedule(
            counting(Arc::clone(&counter)),
            TaskRequest::interval(1).with_id("c-counting"),
        )
        .await
        .unwrap();

        let report = svc.tick().await;
        assert_eq!(report.fired.len(), 3);
        report.join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(svc.list_tasks().await.len(), 3);
    }

    #[tokio::test]
    async fn test_args_reach_callable() {
        let (svc, _, _) = setup(0);
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&seen);
        svc.schedule(
            task_fn(move |args: TaskArgs| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock().unwrap() = Some(args);
                    Ok::<(), anyhow::Error>(())
                }
            }),
            TaskRequest::interval(10)
                .with_id("greet")
                .with_args(vec![json!(42)])
                .with_kwarg("chat", json!("me")),
        )
        .await
        .unwrap();

        svc.tick().await.join().await;
        let args = seen.lock().unwrap().clone().unwrap();
        assert_eq!(args.task_id, "greet");
        assert_eq!(args.args, vec![json!(42)]);
        assert_eq!(args.kwargs["chat"], json!("me"));
    }

    #[tokio::test]
    async fn test_mutations_persist_records_only() {
        let (svc, store, _) = setup(0);
        let id = svc.schedule(noop(), TaskRequest::interval(3)).await.unwrap();
        assert_eq!(store.save_count(), 1);
        svc.pause(&id).await;
        assert_eq!(store.save_count(), 2);
        svc.tick().await;
        // Paused: nothing changed, nothing saved.
        assert_eq!(store.save_count(), 2);

        let saved = store.snapshot();
        assert_eq!(saved.len(), 1);
        assert!(!saved[0].enabled);
    }

    #[tokio::test]
    async fn test_restored_records_stay_dormant_until_rearmed() {
        let (seed_svc, seed_store, _) = setup(0);
        let id = seed_svc
            .schedule(noop(), TaskRequest::interval(1).with_id("digest"))
            .await
            .unwrap();
        seed_svc.tick().await;
        let persisted = seed_store.snapshot();
        assert_eq!(persisted[0].executed_count, 1);

        let store = Arc::new(InMemoryStore::with_tasks(persisted));
        let clock = Arc::new(ManualClock::new(5_000));
        let svc = make_svc(Arc::clone(&store), Arc::clone(&clock));
        svc.start().await.unwrap();

        assert_eq!(svc.list_tasks().await.len(), 1);
        assert!(!svc.is_armed(&id).await);
        assert!(svc.tick().await.fired.is_empty());
        assert_eq!(svc.status().await.armed_count, 0);

        let counter = Arc::new(AtomicUsize::new(0));
        svc.schedule(
            counting(Arc::clone(&counter)),
            TaskRequest::interval(1).with_id("digest"),
        )
        .await
        .unwrap();
        assert!(svc.is_armed(&id).await);
        svc.tick().await.join().await;
        assert_eq!(svc.get_task(&id).await.unwrap().executed_count, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        svc.stop().await;
    }

    #[tokio::test]
    async fn test_start_stop() {
        let store = Arc::new(InMemoryStore::new());
        let svc = Scheduler::with_options(store, Arc::new(SystemClock), SchedulerOptions {
            tick_interval: Duration::from_millis(20),
            ..Default::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        svc.schedule(counting(Arc::clone(&counter)), TaskRequest::interval(60))
            .await
            .unwrap();

        svc.start().await.unwrap();
        assert!(svc.status().await.running);
        tokio::time::sleep(Duration::from_millis(200)).await;
        svc.stop().await;

        assert!(!svc.is_running().await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_reports_next_armed_run() {
        let (svc, _, _) = setup(1_000);
        svc.schedule(noop(), TaskRequest::interval(5).starting_at(9_000))
            .await
            .unwrap();
        let paused = svc
            .schedule(noop(), TaskRequest::interval(5).starting_at(2_000))
            .await
            .unwrap();
        svc.pause(&paused).await;

        let status = svc.status().await;
        assert_eq!(status.task_count, 2);
        assert_eq!(status.enabled_count, 1);
        assert_eq!(status.armed_count, 2);
        assert_eq!(status.next_execution_at_ms, Some(9_000));
    }
}
