// src/exec/executor.rs

//! Type dispatch from a task row to exactly one handler.
//!
//! The executor returns errors as values; it never panics and never swallows
//! a handler failure. On success it returns a one-line summary that the
//! scheduler stores as the execution log's output.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{Result, WardenError};
use crate::exec::backend::{TaskHandlers, WorkerDirectory};
use crate::tasks::{ScheduledTask, TaskParams};
use crate::types::{TaskType, WorkerId};

pub struct TaskExecutor {
    handlers: TaskHandlers,
    workers: Arc<dyn WorkerDirectory>,
}

impl TaskExecutor {
    pub fn new(handlers: TaskHandlers, workers: Arc<dyn WorkerDirectory>) -> Self {
        Self { handlers, workers }
    }

    pub async fn execute(&self, task: &ScheduledTask) -> Result<String> {
        let task_type: TaskType = task
            .task_type
            .parse()
            .map_err(WardenError::UnknownTaskType)?;
        let params = TaskParams::parse(task_type, &task.params)?;

        info!(task_id = task.id, name = %task.name, %task_type, "executing task");
        self.dispatch(params).await
    }

    /// Run already-validated params.
    pub async fn dispatch(&self, params: TaskParams) -> Result<String> {
        match params {
            TaskParams::Backup {
                workers,
                kind,
                note,
            } => self.backup(workers, &kind, &note).await,
            TaskParams::Restart { worker } => {
                self.handlers
                    .restart
                    .restart_worker(worker)
                    .await
                    .map_err(failed(TaskType::Restart, worker))?;
                Ok(format!("restarted worker {worker}"))
            }
            TaskParams::CleanupBackup {
                worker,
                days_to_keep,
            } => {
                self.handlers
                    .cleanup_backup
                    .cleanup_old_backups(worker, days_to_keep)
                    .await
                    .map_err(failed(TaskType::CleanupBackup, worker))?;
                Ok(format!(
                    "pruned backups older than {days_to_keep} day(s) for {}",
                    scope(worker)
                ))
            }
            TaskParams::CleanupLog {
                worker,
                days_to_keep,
            } => {
                self.handlers
                    .cleanup_log
                    .cleanup_old_logs(worker, days_to_keep)
                    .await
                    .map_err(failed(TaskType::CleanupLog, worker))?;
                Ok(format!(
                    "pruned logs older than {days_to_keep} day(s) for {}",
                    scope(worker)
                ))
            }
            TaskParams::Broadcast { worker, message } => {
                self.handlers
                    .broadcast
                    .send_broadcast(worker, &message)
                    .await
                    .map_err(failed(TaskType::Broadcast, worker))?;
                Ok(format!("broadcast sent to worker {worker}"))
            }
            TaskParams::CustomCommand { worker, command } => {
                self.handlers
                    .custom_command
                    .execute_command(worker, &command)
                    .await
                    .map_err(failed(TaskType::CustomCommand, worker))?;
                Ok(format!("command sent to worker {worker}"))
            }
        }
    }

    /// Fail-fast: the first per-worker error aborts the remaining backups.
    async fn backup(&self, workers: Vec<WorkerId>, kind: &str, note: &str) -> Result<String> {
        let targets = if workers.is_empty() {
            debug!("no workers listed; backing up every known worker");
            self.workers.worker_ids()
        } else {
            workers
        };

        if targets.is_empty() {
            warn!("backup task has no workers to back up");
        }

        for worker in &targets {
            debug!(worker, kind, "backing up worker");
            self.handlers
                .backup
                .create_backup(*worker, kind, note)
                .await
                .map_err(failed(TaskType::Backup, *worker))?;
        }

        Ok(format!("backed up {} worker(s)", targets.len()))
    }
}

fn failed(task_type: TaskType, worker: WorkerId) -> impl FnOnce(anyhow::Error) -> WardenError {
    move |source| WardenError::HandlerFailed {
        task_type,
        worker,
        source,
    }
}

fn scope(worker: WorkerId) -> String {
    if worker == crate::types::GLOBAL_SCOPE {
        "global scope".to_string()
    } else {
        format!("worker {worker}")
    }
}
