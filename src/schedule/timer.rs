// src/schedule/timer.rs

//! Timer engine: one driver task per registered entry.
//!
//! A driver computes the next occurrence, sleeps until it, spawns the job and
//! loops. Jobs run in their own Tokio task, so a slow job never delays the
//! next tick computation. Replacing or removing an entry aborts its driver;
//! jobs already spawned keep running to completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::exec::BoxFuture;
use crate::schedule::expression::Schedule;
use crate::tasks::TaskId;

/// Work started on every tick.
pub type TimerJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

type NextSlot = Arc<Mutex<Option<DateTime<Local>>>>;

struct Entry {
    schedule: Arc<Schedule>,
    job: TimerJob,
    next: NextSlot,
    driver: Option<JoinHandle<()>>,
}

impl Entry {
    fn abort(&mut self) {
        if let Some(handle) = self.driver.take() {
            handle.abort();
        }
    }
}

#[derive(Default)]
struct EngineState {
    running: bool,
    entries: HashMap<TaskId, Entry>,
}

#[derive(Default)]
pub struct TimerEngine {
    state: Mutex<EngineState>,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `job` under `id`, replacing (not duplicating) any existing
    /// entry. If the engine is running the driver starts immediately.
    pub fn add(&self, id: TaskId, schedule: Schedule, job: TimerJob) {
        let schedule = Arc::new(schedule);
        let next: NextSlot = Arc::new(Mutex::new(schedule.next_after(&Local::now())));

        let mut state = self.lock();
        if let Some(mut old) = state.entries.remove(&id) {
            debug!(task_id = id, "replacing timer entry");
            old.abort();
        }

        let mut entry = Entry {
            schedule,
            job,
            next,
            driver: None,
        };
        if state.running {
            entry.driver = Some(spawn_driver(id, &entry));
        }
        state.entries.insert(id, entry);
    }

    pub fn remove(&self, id: TaskId) -> bool {
        match self.lock().entries.remove(&id) {
            Some(mut entry) => {
                entry.abort();
                debug!(task_id = id, "timer entry removed");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Source text of the entry's schedule.
    pub fn expression(&self, id: TaskId) -> Option<String> {
        self.lock()
            .entries
            .get(&id)
            .map(|entry| entry.schedule.as_str().to_string())
    }

    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Next fire time of the entry; always in the future when present.
    pub fn next_run(&self, id: TaskId) -> Option<DateTime<Local>> {
        let state = self.lock();
        let entry = state.entries.get(&id)?;

        let now = Local::now();
        let published = *lock_slot(&entry.next);
        match published {
            Some(next) if next > now => Some(next),
            _ => entry.schedule.next_after(&now),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn start(&self) {
        let mut state = self.lock();
        if state.running {
            return;
        }
        state.running = true;
        for (id, entry) in state.entries.iter_mut() {
            entry.driver = Some(spawn_driver(*id, entry));
        }
        debug!(entries = state.entries.len(), "timer engine started");
    }

    /// Stop every driver. Entries stay registered; `start` resumes them.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.running = false;
        for entry in state.entries.values_mut() {
            entry.abort();
        }
        debug!("timer engine stopped");
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_slot(slot: &NextSlot) -> MutexGuard<'_, Option<DateTime<Local>>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn spawn_driver(id: TaskId, entry: &Entry) -> JoinHandle<()> {
    let schedule = Arc::clone(&entry.schedule);
    let job = Arc::clone(&entry.job);
    let slot = Arc::clone(&entry.next);

    tokio::spawn(async move {
        let mut last_fire: Option<DateTime<Local>> = None;

        loop {
            // Never compute from before the previous fire: a wake-up that
            // lands a hair early must not yield the same occurrence twice.
            let now = Local::now();
            let cursor = match last_fire {
                Some(last) if last > now => last,
                _ => now,
            };

            let Some(next) = schedule.next_after(&cursor) else {
                warn!(task_id = id, schedule = %schedule, "schedule has no future occurrence; driver exiting");
                *lock_slot(&slot) = None;
                return;
            };
            *lock_slot(&slot) = Some(next);

            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            trace!(task_id = id, next = %next, ?wait, "timer sleeping");
            sleep(wait).await;

            last_fire = Some(next);
            debug!(task_id = id, "timer fired");
            tokio::spawn(job());
        }
    })
}
