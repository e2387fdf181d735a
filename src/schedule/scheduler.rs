// src/schedule/scheduler.rs

//! Persistent cron scheduler.
//!
//! Holds at most one timer entry per enabled task and runs every trigger
//! (timer tick or manual "run now") through the same [`Scheduler::execute_task`]
//! path:
//!
//! 1. reload the task row from the store
//! 2. mark it `running` and persist
//! 3. create a `running` execution-log row
//! 4. run the executor, timing it
//! 5. fold the outcome into the counters
//! 6. recompute `next_run_at`, persist the row, finalize the log row in place
//!
//! A failed execution never unschedules or disables the task. Two triggers
//! for the same task never overlap: a later timer tick is skipped with a
//! warning, a later "run now" is refused with `AlreadyExecuting`.
//!
//! The store may also be edited by another process (the `warden task`
//! commands). [`Scheduler::resync`] brings the timers back in line with it,
//! and [`Scheduler::watch_store`] runs that on an interval.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::errors::{Result, WardenError};
use crate::exec::{BoxFuture, TaskExecutor};
use crate::schedule::expression::Schedule;
use crate::schedule::timer::{TimerEngine, TimerJob};
use crate::tasks::{ScheduledTask, TaskExecutionLog, TaskId, TaskStore};

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

type InFlightSet = Arc<Mutex<HashSet<TaskId>>>;

struct Inner {
    store: Arc<dyn TaskStore>,
    executor: Arc<TaskExecutor>,
    timers: TimerEngine,
    in_flight: InFlightSet,
    store_watch: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the task's in-flight mark when the execution ends, however it ends.
struct InFlight {
    set: InFlightSet,
    id: TaskId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Scheduler {
    pub fn new(store: Arc<dyn TaskStore>, executor: Arc<TaskExecutor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                executor,
                timers: TimerEngine::new(),
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                store_watch: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.store
    }

    /// Register every enabled task and start the timer engine. Tasks whose
    /// schedule no longer parses are logged and skipped. Returns how many
    /// tasks were scheduled.
    pub fn start(&self) -> Result<usize> {
        let tasks = self.inner.store.get_enabled()?;
        let mut scheduled = 0;
        for task in &tasks {
            match self.add_task(task) {
                Ok(()) => scheduled += 1,
                Err(e) => warn!(task_id = task.id, name = %task.name, error = %e, "task not scheduled"),
            }
        }

        self.inner.timers.start();
        info!(scheduled, "scheduler started");
        Ok(scheduled)
    }

    /// Stop firing and stop watching the store. In-flight executions run to
    /// completion.
    pub fn stop(&self) {
        if let Some(watch) = lock(&self.inner.store_watch).take() {
            watch.abort();
        }
        self.inner.timers.stop();
        info!("scheduler stopped");
    }

    /// Re-read the store every `every` and [`resync`](Self::resync) the
    /// timers, until [`stop`](Self::stop). Replaces an earlier watch.
    pub fn watch_store(&self, every: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; `start` just synced.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = (Scheduler { inner }).resync() {
                    warn!(error = %e, "task store resync failed");
                }
            }
        });

        if let Some(old) = lock(&self.inner.store_watch).replace(handle) {
            old.abort();
        }
        debug!(?every, "watching task store");
    }

    /// Make the timers match the store: schedule enabled tasks that are new or
    /// whose expression changed, unschedule disabled and deleted ones.
    /// Returns how many timer entries changed.
    pub fn resync(&self) -> Result<usize> {
        let tasks = self.inner.store.get_all()?;
        let mut changed = 0;

        for task in &tasks {
            let scheduled = self.inner.timers.expression(task.id);
            if task.enabled {
                if scheduled.as_deref() == Some(task.cron_expression.trim()) {
                    continue;
                }
                match self.add_task(task) {
                    Ok(()) => changed += 1,
                    Err(e) => {
                        debug!(task_id = task.id, error = %e, "task not rescheduled");
                        if scheduled.is_some() {
                            self.remove_task(task.id);
                            changed += 1;
                        }
                    }
                }
            } else if scheduled.is_some() {
                self.reload_task(task.id)?;
                changed += 1;
            }
        }

        let known: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
        for id in self.inner.timers.ids() {
            if !known.contains(&id) {
                self.remove_task(id);
                changed += 1;
            }
        }

        if changed > 0 {
            info!(changed, "schedule resynced from task store");
        }
        Ok(changed)
    }

    /// Install (or replace) the task's timer entry and persist `next_run_at`.
    pub fn add_task(&self, task: &ScheduledTask) -> Result<()> {
        let schedule = Schedule::parse(&task.cron_expression)?;
        let id = task.id;

        let weak = Arc::downgrade(&self.inner);
        let job: TimerJob = Arc::new(move || -> BoxFuture<'static, ()> {
            let weak = Weak::clone(&weak);
            Box::pin(async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = inner.execute(id).await {
                    error!(task_id = id, error = %e, "scheduled execution could not be recorded");
                }
            })
        });

        self.inner.timers.add(id, schedule, job);
        debug!(task_id = id, expr = %task.cron_expression, "task scheduled");

        let next = self.next_run(id).map(|t| t.with_timezone(&Utc));
        match self.inner.store.get_by_id(id) {
            Ok(mut row) => {
                row.next_run_at = next;
                self.inner.store.update(&row)?;
            }
            Err(WardenError::TaskNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub fn remove_task(&self, id: TaskId) {
        if self.inner.timers.remove(id) {
            debug!(task_id = id, "task unscheduled");
        }
    }

    /// Make the timer state follow the stored `enabled` flag.
    pub fn reload_task(&self, id: TaskId) -> Result<()> {
        match self.inner.store.get_by_id(id) {
            Ok(task) if task.enabled => self.add_task(&task),
            Ok(mut task) => {
                self.remove_task(id);
                if task.next_run_at.is_some() {
                    task.next_run_at = None;
                    self.inner.store.update(&task)?;
                }
                Ok(())
            }
            Err(WardenError::TaskNotFound(_)) => {
                self.remove_task(id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run one execution now and wait for it. `Ok(None)` means another
    /// execution of the same task was in flight and this trigger was skipped.
    pub async fn execute_task(&self, id: TaskId) -> Result<Option<TaskExecutionLog>> {
        self.inner.execute(id).await
    }

    /// Fire-and-forget manual trigger; same code path as a timer tick.
    /// `AlreadyExecuting` if an execution of the task is in flight.
    pub fn run_now(&self, id: TaskId) -> Result<()> {
        self.inner.store.get_by_id(id)?;
        let claim = self.inner.claim(id).ok_or(WardenError::AlreadyExecuting(id))?;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.run_claimed(id, claim).await {
                error!(task_id = id, error = %e, "manual execution could not be recorded");
            }
        });
        Ok(())
    }

    pub fn next_run(&self, id: TaskId) -> Option<DateTime<Local>> {
        self.inner.timers.next_run(id)
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.inner.timers.contains(id)
    }

    pub fn scheduled_ids(&self) -> Vec<TaskId> {
        self.inner.timers.ids()
    }

    pub fn is_executing(&self, id: TaskId) -> bool {
        lock(&self.inner.in_flight).contains(&id)
    }
}

impl Inner {
    fn claim(&self, id: TaskId) -> Option<InFlight> {
        if !lock(&self.in_flight).insert(id) {
            return None;
        }
        Some(InFlight {
            set: Arc::clone(&self.in_flight),
            id,
        })
    }

    async fn execute(&self, id: TaskId) -> Result<Option<TaskExecutionLog>> {
        let Some(claim) = self.claim(id) else {
            warn!(task_id = id, "previous execution still running; skipping trigger");
            return Ok(None);
        };
        self.run_claimed(id, claim).await.map(Some)
    }

    async fn run_claimed(&self, id: TaskId, _claim: InFlight) -> Result<TaskExecutionLog> {
        let mut task = self.store.get_by_id(id)?;
        let started = Utc::now();
        task.begin_run(started);
        self.store.update(&task)?;

        let mut log = match self.store.create_log(TaskExecutionLog::started(id, started)) {
            Ok(log) => log,
            Err(e) => {
                // The row must not stay `running`; record the attempt as failed.
                let message = format!("execution log could not be created: {e}");
                let _ = self.fold_outcome(id, started, Some(&message));
                return Err(e);
            }
        };

        let clock = Instant::now();
        let outcome = self
            .executor
            .execute(&task)
            .await
            .map_err(|e| e.to_string());
        let elapsed = clock.elapsed();

        match &outcome {
            Ok(summary) => info!(task_id = id, name = %task.name, ?elapsed, %summary, "task succeeded"),
            Err(message) => warn!(task_id = id, name = %task.name, ?elapsed, error = %message, "task failed"),
        }

        let error = outcome.as_ref().err().map(String::as_str);
        let folded = self.fold_outcome(id, started, error);

        log.finish(Utc::now(), &outcome);
        log.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match self.store.update_log(&log) {
            Ok(()) => {}
            // Deleting the task cascades to its logs.
            Err(e) if self.store.get_by_id(id).is_err() => {
                debug!(task_id = id, error = %e, "log row gone with its task");
            }
            Err(e) => return Err(e),
        }

        folded.map(|()| log)
    }

    /// Fold the outcome into a fresh copy of the row, so edits made while the
    /// task ran survive. A task deleted meanwhile is not an error. Store
    /// errors are logged here and returned for the caller to propagate once
    /// the log row is finalized.
    fn fold_outcome(&self, id: TaskId, started: DateTime<Utc>, error: Option<&str>) -> Result<()> {
        let next = self.timers.next_run(id).map(|t| t.with_timezone(&Utc));
        let result = match self.store.get_by_id(id) {
            Ok(mut row) => {
                row.last_run_at = Some(started);
                row.finish_run(error, next);
                self.store.update(&row).map(|_| ())
            }
            Err(WardenError::TaskNotFound(_)) => {
                debug!(task_id = id, "task deleted during execution; counters not recorded");
                Ok(())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            error!(task_id = id, error = %e, "could not record execution outcome on the task row");
        }
        result
    }
}
