// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] defines the collaborator traits the executor calls, one per
//!   task type, plus the [`WorkerDirectory`] used to enumerate workers.
//! - [`executor`] parses a task's params and dispatches to exactly one
//!   handler, wrapping failures with task-type and worker context.
//! - [`handlers`] holds the production handlers (backup copy, restart,
//!   retention, console commands).
//! - [`retention`] prunes files and folders older than a day window.

pub mod backend;
pub mod executor;
pub mod handlers;
pub mod retention;

pub use backend::{
    BackupHandler, BoxFuture, BroadcastHandler, CleanupBackupHandler, CleanupLogHandler,
    CustomCommandHandler, RestartHandler, TaskHandlers, WorkerDirectory,
};
pub use executor::TaskExecutor;
pub use handlers::WorkerHandlers;
pub use retention::{PruneTarget, prune_before, prune_older_than};
