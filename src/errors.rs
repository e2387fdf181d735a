// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::tasks::TaskId;
use crate::types::{TaskType, WorkerId};

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("worker {0} is already running")]
    AlreadyRunning(WorkerId),

    #[error("failed to spawn worker {worker}: {reason}")]
    SpawnFailed { worker: WorkerId, reason: String },

    #[error("command channel of worker {worker} is unavailable: {reason}")]
    ChannelUnavailable { worker: WorkerId, reason: String },

    #[error("worker {worker} (pid {pid}) could not be terminated")]
    Unkillable { worker: WorkerId, pid: u32 },

    #[error("worker {0} is not running")]
    NotRunning(WorkerId),

    #[error("worker {0} is still stopping")]
    StopInProgress(WorkerId),

    #[error("invalid task params: {0}")]
    InvalidParams(String),

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("{task_type} task failed for worker {worker}: {source:#}")]
    HandlerFailed {
        task_type: TaskType,
        worker: WorkerId,
        #[source]
        source: anyhow::Error,
    },

    #[error("worker {0} is not defined")]
    WorkerNotFound(WorkerId),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {0} is already executing")]
    AlreadyExecuting(TaskId),

    #[error("invalid schedule expression: {0}")]
    InvalidSchedule(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WardenError>;
