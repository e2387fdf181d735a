// src/tasks/params.rs

//! Typed view of a task's parameter bag.
//!
//! Stored params are an untyped JSON object. They are converted into
//! [`TaskParams`] once, before dispatch, so handlers never dig through the raw map.
//!
//! Accepted keys (camelCase): `workerIds`, `workerId`, `backupType`, `note`,
//! `daysToKeep`, `message`, `command`. `roomIds` / `roomId` are accepted as
//! aliases for rows written by older tooling.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{Result, WardenError};
use crate::types::{GLOBAL_SCOPE, TaskType, WorkerId};

pub const DEFAULT_BACKUP_KIND: &str = "full";
pub const DEFAULT_DAYS_TO_KEEP: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskParams {
    /// Empty `workers` means every known worker.
    Backup {
        workers: Vec<WorkerId>,
        kind: String,
        note: String,
    },
    Restart {
        worker: WorkerId,
    },
    CleanupBackup {
        worker: WorkerId,
        days_to_keep: u32,
    },
    CleanupLog {
        worker: WorkerId,
        days_to_keep: u32,
    },
    Broadcast {
        worker: WorkerId,
        message: String,
    },
    CustomCommand {
        worker: WorkerId,
        command: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParams {
    #[serde(default, alias = "roomIds")]
    worker_ids: Vec<WorkerId>,
    #[serde(default, alias = "roomId")]
    worker_id: Option<WorkerId>,
    #[serde(default)]
    backup_type: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    days_to_keep: Option<u32>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    command: Option<String>,
}

impl TaskParams {
    pub fn parse(task_type: TaskType, params: &Value) -> Result<Self> {
        let raw = decode(params)?;

        let parsed = match task_type {
            TaskType::Backup => TaskParams::Backup {
                workers: raw.worker_ids,
                kind: raw
                    .backup_type
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_BACKUP_KIND.to_string()),
                note: raw.note.unwrap_or_default(),
            },
            TaskType::Restart => TaskParams::Restart {
                worker: required_worker(task_type, raw.worker_id)?,
            },
            TaskType::CleanupBackup => TaskParams::CleanupBackup {
                worker: raw.worker_id.unwrap_or(GLOBAL_SCOPE),
                days_to_keep: raw.days_to_keep.unwrap_or(DEFAULT_DAYS_TO_KEEP),
            },
            TaskType::CleanupLog => TaskParams::CleanupLog {
                worker: raw.worker_id.unwrap_or(GLOBAL_SCOPE),
                days_to_keep: raw.days_to_keep.unwrap_or(DEFAULT_DAYS_TO_KEEP),
            },
            TaskType::Broadcast => TaskParams::Broadcast {
                worker: required_worker(task_type, raw.worker_id)?,
                message: required_text(task_type, "message", raw.message)?,
            },
            TaskType::CustomCommand => TaskParams::CustomCommand {
                worker: required_worker(task_type, raw.worker_id)?,
                command: required_text(task_type, "command", raw.command)?,
            },
        };

        Ok(parsed)
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskParams::Backup { .. } => TaskType::Backup,
            TaskParams::Restart { .. } => TaskType::Restart,
            TaskParams::CleanupBackup { .. } => TaskType::CleanupBackup,
            TaskParams::CleanupLog { .. } => TaskType::CleanupLog,
            TaskParams::Broadcast { .. } => TaskType::Broadcast,
            TaskParams::CustomCommand { .. } => TaskType::CustomCommand,
        }
    }
}

/// `null` and `{}` are both "no params". A JSON-encoded string is unwrapped
/// first, matching rows that stored params as text.
fn decode(params: &Value) -> Result<RawParams> {
    match params {
        Value::Null => Ok(RawParams::default()),
        Value::String(text) if text.trim().is_empty() => Ok(RawParams::default()),
        Value::String(text) => {
            let inner: Value = serde_json::from_str(text)
                .map_err(|e| WardenError::InvalidParams(format!("params text is not JSON: {e}")))?;
            decode(&inner)
        }
        Value::Object(_) => serde_json::from_value(params.clone())
            .map_err(|e| WardenError::InvalidParams(e.to_string())),
        other => Err(WardenError::InvalidParams(format!(
            "params must be an object, got {other}"
        ))),
    }
}

fn required_worker(task_type: TaskType, worker: Option<WorkerId>) -> Result<WorkerId> {
    match worker {
        Some(id) if id != GLOBAL_SCOPE => Ok(id),
        _ => Err(WardenError::InvalidParams(format!(
            "workerId is required for {task_type} tasks"
        ))),
    }
}

fn required_text(task_type: TaskType, key: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(WardenError::InvalidParams(format!(
            "{key} is required for {task_type} tasks"
        ))),
    }
}
