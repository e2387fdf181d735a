// src/exec/backend.rs

//! Pluggable operation handlers.
//!
//! The executor never performs a backup, restart or cleanup itself; it calls
//! one of the traits below. Production wiring uses
//! [`WorkerHandlers`](super::handlers::WorkerHandlers); tests can provide
//! their own implementation that records calls instead of touching processes
//! or files.
//!
//! Methods return boxed futures so the traits stay object safe and can be
//! stored as `Arc<dyn ...>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::types::WorkerId;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait BackupHandler: Send + Sync {
    fn create_backup<'a>(
        &'a self,
        worker: WorkerId,
        kind: &'a str,
        note: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

pub trait RestartHandler: Send + Sync {
    fn restart_worker(&self, worker: WorkerId) -> BoxFuture<'_, anyhow::Result<()>>;
}

pub trait CleanupBackupHandler: Send + Sync {
    fn cleanup_old_backups(
        &self,
        worker: WorkerId,
        days_to_keep: u32,
    ) -> BoxFuture<'_, anyhow::Result<()>>;
}

pub trait CleanupLogHandler: Send + Sync {
    fn cleanup_old_logs(
        &self,
        worker: WorkerId,
        days_to_keep: u32,
    ) -> BoxFuture<'_, anyhow::Result<()>>;
}

pub trait BroadcastHandler: Send + Sync {
    fn send_broadcast<'a>(
        &'a self,
        worker: WorkerId,
        message: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

pub trait CustomCommandHandler: Send + Sync {
    fn execute_command<'a>(
        &'a self,
        worker: WorkerId,
        command: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Source of "all known workers" for backup tasks with no explicit list.
pub trait WorkerDirectory: Send + Sync {
    fn worker_ids(&self) -> Vec<WorkerId>;
}

/// One handler per task type.
#[derive(Clone)]
pub struct TaskHandlers {
    pub backup: Arc<dyn BackupHandler>,
    pub restart: Arc<dyn RestartHandler>,
    pub cleanup_backup: Arc<dyn CleanupBackupHandler>,
    pub cleanup_log: Arc<dyn CleanupLogHandler>,
    pub broadcast: Arc<dyn BroadcastHandler>,
    pub custom_command: Arc<dyn CustomCommandHandler>,
}

impl TaskHandlers {
    /// Use one value for every task type.
    pub fn uniform<H>(handler: Arc<H>) -> Self
    where
        H: BackupHandler
            + RestartHandler
            + CleanupBackupHandler
            + CleanupLogHandler
            + BroadcastHandler
            + CustomCommandHandler
            + 'static,
    {
        Self {
            backup: handler.clone(),
            restart: handler.clone(),
            cleanup_backup: handler.clone(),
            cleanup_log: handler.clone(),
            broadcast: handler.clone(),
            custom_command: handler,
        }
    }
}
