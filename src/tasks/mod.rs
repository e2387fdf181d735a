// src/tasks/mod.rs

//! Scheduled task definitions, execution logs and their storage.

pub mod json_store;
pub mod model;
pub mod params;
pub mod store;

pub use json_store::JsonTaskStore;
pub use model::{LogId, ScheduledTask, TaskExecutionLog, TaskId};
pub use params::TaskParams;
pub use store::{LOGS_PER_TASK, MemoryTaskStore, StoreState, TaskStore};
