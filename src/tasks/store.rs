// src/tasks/store.rs

//! Task persistence.
//!
//! [`TaskStore`] is the only thing the scheduler and the facade know about
//! storage. Both shipped stores share [`StoreState`], the pure in-memory
//! table logic; [`JsonTaskStore`](super::JsonTaskStore) adds a file behind it.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, WardenError};
use crate::tasks::model::{LogId, ScheduledTask, TaskExecutionLog, TaskId};

/// Execution-log rows kept per task; older rows are dropped as new ones arrive.
pub const LOGS_PER_TASK: usize = 200;

/// Durable storage for task definitions and their execution logs.
///
/// Each call is consistent on its own; nothing is transactional across calls.
pub trait TaskStore: Send + Sync {
    fn get_all(&self) -> Result<Vec<ScheduledTask>>;

    /// `TaskNotFound` if there is no such row.
    fn get_by_id(&self, id: TaskId) -> Result<ScheduledTask>;

    fn get_enabled(&self) -> Result<Vec<ScheduledTask>>;

    /// Assigns a fresh id and timestamps; the incoming id is ignored.
    fn create(&self, task: ScheduledTask) -> Result<ScheduledTask>;

    /// Replaces the row with the same id and stamps `updated_at`.
    fn update(&self, task: &ScheduledTask) -> Result<ScheduledTask>;

    /// Removes the task and every log row that belongs to it.
    fn delete(&self, id: TaskId) -> Result<()>;

    /// Appends a row. Keeps at most [`LOGS_PER_TASK`] rows for the task,
    /// dropping the oldest.
    fn create_log(&self, log: TaskExecutionLog) -> Result<TaskExecutionLog>;

    /// Overwrites an existing log row in place.
    fn update_log(&self, log: &TaskExecutionLog) -> Result<()>;

    /// Newest first. `limit == 0` returns every row.
    fn get_logs(&self, task_id: TaskId, limit: usize) -> Result<Vec<TaskExecutionLog>>;

    /// Returns how many rows were removed.
    fn delete_logs(&self, task_id: TaskId) -> Result<usize>;
}

/// Serializable table state shared by the in-memory and JSON stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    #[serde(default)]
    next_task_id: TaskId,
    #[serde(default)]
    next_log_id: LogId,
    #[serde(default)]
    tasks: BTreeMap<TaskId, ScheduledTask>,
    #[serde(default)]
    logs: Vec<TaskExecutionLog>,
}

impl StoreState {
    pub fn all(&self) -> Vec<ScheduledTask> {
        self.tasks.values().cloned().collect()
    }

    pub fn get(&self, id: TaskId) -> Result<ScheduledTask> {
        self.tasks
            .get(&id)
            .cloned()
            .ok_or(WardenError::TaskNotFound(id))
    }

    pub fn enabled(&self) -> Vec<ScheduledTask> {
        self.tasks.values().filter(|t| t.enabled).cloned().collect()
    }

    pub fn create(&mut self, mut task: ScheduledTask) -> ScheduledTask {
        // Keep ids monotonic even if the file was edited by hand.
        let floor = self.tasks.keys().next_back().copied().unwrap_or(0);
        self.next_task_id = self.next_task_id.max(floor) + 1;

        let now = Utc::now();
        task.id = self.next_task_id;
        task.created_at = now;
        task.updated_at = now;
        task.reset_counters();

        self.tasks.insert(task.id, task.clone());
        task
    }

    pub fn update(&mut self, task: &ScheduledTask) -> Result<ScheduledTask> {
        let slot = self
            .tasks
            .get_mut(&task.id)
            .ok_or(WardenError::TaskNotFound(task.id))?;

        let mut updated = task.clone();
        updated.created_at = slot.created_at;
        updated.updated_at = Utc::now();
        *slot = updated.clone();
        Ok(updated)
    }

    pub fn delete(&mut self, id: TaskId) -> Result<()> {
        if self.tasks.remove(&id).is_none() {
            return Err(WardenError::TaskNotFound(id));
        }
        self.logs.retain(|log| log.task_id != id);
        Ok(())
    }

    pub fn create_log(&mut self, mut log: TaskExecutionLog) -> TaskExecutionLog {
        let floor = self.logs.iter().map(|l| l.id).max().unwrap_or(0);
        self.next_log_id = self.next_log_id.max(floor) + 1;

        log.id = self.next_log_id;
        self.logs.push(log.clone());
        self.trim_logs(log.task_id);
        log
    }

    fn trim_logs(&mut self, task_id: TaskId) {
        let mut owned: Vec<_> = self
            .logs
            .iter()
            .filter(|l| l.task_id == task_id)
            .map(|l| (l.started_at, l.id))
            .collect();
        if owned.len() <= LOGS_PER_TASK {
            return;
        }

        owned.sort_unstable();
        let excess = owned.len() - LOGS_PER_TASK;
        let dropped: HashSet<LogId> = owned[..excess].iter().map(|(_, id)| *id).collect();
        self.logs.retain(|l| !dropped.contains(&l.id));
    }

    pub fn update_log(&mut self, log: &TaskExecutionLog) -> Result<()> {
        let slot = self
            .logs
            .iter_mut()
            .find(|l| l.id == log.id)
            .ok_or_else(|| WardenError::Other(anyhow!("execution log {} not found", log.id)))?;
        *slot = log.clone();
        Ok(())
    }

    pub fn logs(&self, task_id: TaskId, limit: usize) -> Vec<TaskExecutionLog> {
        let mut rows: Vec<TaskExecutionLog> = self
            .logs
            .iter()
            .filter(|l| l.task_id == task_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        if limit > 0 {
            rows.truncate(limit);
        }
        rows
    }

    pub fn delete_logs(&mut self, task_id: TaskId) -> usize {
        let before = self.logs.len();
        self.logs.retain(|l| l.task_id != task_id);
        before - self.logs.len()
    }
}

/// Volatile store. Used by tests and by `warden run` when no file is wanted.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    state: Mutex<StoreState>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TaskStore for MemoryTaskStore {
    fn get_all(&self) -> Result<Vec<ScheduledTask>> {
        Ok(self.state().all())
    }

    fn get_by_id(&self, id: TaskId) -> Result<ScheduledTask> {
        self.state().get(id)
    }

    fn get_enabled(&self) -> Result<Vec<ScheduledTask>> {
        Ok(self.state().enabled())
    }

    fn create(&self, task: ScheduledTask) -> Result<ScheduledTask> {
        Ok(self.state().create(task))
    }

    fn update(&self, task: &ScheduledTask) -> Result<ScheduledTask> {
        self.state().update(task)
    }

    fn delete(&self, id: TaskId) -> Result<()> {
        self.state().delete(id)
    }

    fn create_log(&self, log: TaskExecutionLog) -> Result<TaskExecutionLog> {
        Ok(self.state().create_log(log))
    }

    fn update_log(&self, log: &TaskExecutionLog) -> Result<()> {
        self.state().update_log(log)
    }

    fn get_logs(&self, task_id: TaskId, limit: usize) -> Result<Vec<TaskExecutionLog>> {
        Ok(self.state().logs(task_id, limit))
    }

    fn delete_logs(&self, task_id: TaskId) -> Result<usize> {
        Ok(self.state().delete_logs(task_id))
    }
}
