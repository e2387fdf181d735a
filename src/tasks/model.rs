// src/tasks/model.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RunStatus;

pub type TaskId = u64;
pub type LogId = u64;

/// A persisted maintenance task definition plus its run bookkeeping.
///
/// `task_type` stays a plain string so a row written by a newer build (or by
/// hand) still loads; the executor rejects unknown types at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: TaskId,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub enabled: bool,
    pub cron_expression: String,
    /// Untyped parameter bag; see [`crate::tasks::TaskParams`].
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_status: Option<RunStatus>,
    #[serde(default)]
    pub last_run_error: Option<String>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failed_count: u64,
}

impl ScheduledTask {
    pub fn new(
        name: impl Into<String>,
        task_type: impl Into<String>,
        cron_expression: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            task_type: task_type.into(),
            enabled: true,
            cron_expression: cron_expression.into(),
            params,
            description: String::new(),
            created_at: now,
            updated_at: now,
            last_run_at: None,
            next_run_at: None,
            last_run_status: None,
            last_run_error: None,
            run_count: 0,
            success_count: 0,
            failed_count: 0,
        }
    }

    pub fn begin_run(&mut self, now: DateTime<Utc>) {
        self.last_run_at = Some(now);
        self.last_run_status = Some(RunStatus::Running);
    }

    /// Record the outcome. Both counters move together so
    /// `run_count == success_count + failed_count` always holds.
    pub fn finish_run(&mut self, error: Option<&str>, next_run_at: Option<DateTime<Utc>>) {
        self.run_count += 1;
        match error {
            None => {
                self.success_count += 1;
                self.last_run_status = Some(RunStatus::Success);
                self.last_run_error = None;
            }
            Some(message) => {
                self.failed_count += 1;
                self.last_run_status = Some(RunStatus::Failed);
                self.last_run_error = Some(message.to_string());
            }
        }
        self.next_run_at = next_run_at;
    }

    pub fn reset_counters(&mut self) {
        self.last_run_at = None;
        self.next_run_at = None;
        self.last_run_status = None;
        self.last_run_error = None;
        self.run_count = 0;
        self.success_count = 0;
        self.failed_count = 0;
    }
}

/// One execution attempt. Created as `running`, finalized in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionLog {
    pub id: LogId,
    pub task_id: TaskId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock milliseconds; 0 until finalized.
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

impl TaskExecutionLog {
    pub fn started(task_id: TaskId, started_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            task_id,
            status: RunStatus::Running,
            started_at,
            finished_at: None,
            duration_ms: 0,
            error_message: None,
            output: None,
        }
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>, outcome: &Result<String, String>) {
        self.finished_at = Some(finished_at);
        self.duration_ms = (finished_at - self.started_at)
            .num_milliseconds()
            .max(0)
            .unsigned_abs();
        match outcome {
            Ok(summary) => {
                self.status = RunStatus::Success;
                self.error_message = None;
                self.output = Some(summary.clone());
            }
            Err(message) => {
                self.status = RunStatus::Failed;
                self.error_message = Some(message.clone());
            }
        }
    }
}
