// src/supervisor.rs

//! Facade over the worker and task machinery.
//!
//! This is the surface an outer layer (the CLI here, an HTTP API elsewhere)
//! calls: start/stop/restart/send-command on a worker, create/update/delete,
//! enable/disable and run-now on a task, and execution-log reads.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ConfigFile;
use crate::errors::{Result, WardenError};
use crate::exec::{TaskExecutor, TaskHandlers, WorkerHandlers};
use crate::process::ProcessRegistry;
use crate::schedule::{Schedule, Scheduler};
use crate::tasks::{ScheduledTask, TaskExecutionLog, TaskId, TaskParams, TaskStore};
use crate::types::{TaskType, WorkerId, WorkerKind};
use crate::workers::{LaunchSettings, TokenLedger, WorkerCatalog, WorkerLauncher};

/// Point-in-time view of one configured worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub name: String,
    pub kind: WorkerKind,
    pub running: bool,
    pub pid: Option<u32>,
}

pub struct Supervisor {
    catalog: Arc<WorkerCatalog>,
    registry: Arc<ProcessRegistry>,
    tokens: Arc<TokenLedger>,
    launcher: Arc<WorkerLauncher>,
    store: Arc<dyn TaskStore>,
    scheduler: Scheduler,
    task_resync: Duration,
}

impl Supervisor {
    /// Production wiring: tasks act on the configured workers.
    pub fn new(cfg: &ConfigFile, store: Arc<dyn TaskStore>) -> Self {
        Self::build(cfg, store, |launcher| {
            TaskHandlers::uniform(Arc::new(WorkerHandlers::new(launcher)))
        })
    }

    /// Same wiring with caller-supplied task handlers.
    pub fn with_handlers(cfg: &ConfigFile, store: Arc<dyn TaskStore>, handlers: TaskHandlers) -> Self {
        Self::build(cfg, store, |_| handlers)
    }

    fn build(
        cfg: &ConfigFile,
        store: Arc<dyn TaskStore>,
        handlers: impl FnOnce(Arc<WorkerLauncher>) -> TaskHandlers,
    ) -> Self {
        let catalog = Arc::new(WorkerCatalog::from_config(cfg));
        let registry = Arc::new(ProcessRegistry::new());
        let tokens = Arc::new(TokenLedger::new());
        let launcher = Arc::new(WorkerLauncher::new(
            Arc::clone(&catalog),
            Arc::clone(&registry),
            Arc::clone(&tokens),
            LaunchSettings::from_config(cfg),
        ));

        let executor = Arc::new(TaskExecutor::new(
            handlers(Arc::clone(&launcher)),
            catalog.clone(),
        ));
        let scheduler = Scheduler::new(Arc::clone(&store), executor);

        Self {
            catalog,
            registry,
            tokens,
            launcher,
            store,
            scheduler,
            task_resync: cfg.supervisor.task_resync,
        }
    }

    pub fn catalog(&self) -> &Arc<WorkerCatalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Start the scheduler and keep it in step with edits other processes make
    /// to the task store. Returns how many tasks were scheduled.
    pub fn start(&self) -> Result<usize> {
        let scheduled = self.scheduler.start()?;
        self.scheduler.watch_store(self.task_resync);
        Ok(scheduled)
    }

    /// Start every worker marked `autostart`. Failures are logged and
    /// returned without aborting the others.
    pub fn autostart(&self) -> Vec<(WorkerId, WardenError)> {
        let mut failures = Vec::new();
        for def in self.catalog.iter().filter(|d| d.autostart) {
            if let Err(e) = self.launcher.start(def.id) {
                warn!(worker = def.id, error = %e, "autostart failed");
                failures.push((def.id, e));
            }
        }
        failures
    }

    /// Stop the timers, then every worker. Failures are logged, not fatal.
    pub async fn shutdown(&self) {
        self.scheduler.stop();
        let failures = self.registry.stop_all().await;
        if failures.is_empty() {
            info!("all workers stopped");
        } else {
            warn!(failed = failures.len(), "some workers could not be stopped");
        }
    }

    // ---- workers ----------------------------------------------------------

    /// Returns the new PID.
    pub fn start_worker(&self, worker: WorkerId) -> Result<u32> {
        Ok(self.launcher.start(worker)?.pid())
    }

    pub async fn stop_worker(&self, worker: WorkerId) -> Result<()> {
        self.launcher.stop(worker).await
    }

    pub async fn restart_worker(&self, worker: WorkerId) -> Result<u32> {
        Ok(self.launcher.restart(worker).await?.pid())
    }

    pub async fn send_command(&self, worker: WorkerId, command: &str) -> Result<()> {
        let process = self
            .registry
            .get(worker)
            .ok_or(WardenError::NotRunning(worker))?;
        process.send_command(command).await
    }

    /// Buffered output of the current (or last) process for `worker`.
    pub fn worker_output(&self, worker: WorkerId) -> Result<String> {
        self.registry
            .get(worker)
            .map(|p| p.output_snapshot())
            .ok_or(WardenError::NotRunning(worker))
    }

    pub fn worker_status(&self, worker: WorkerId) -> Result<WorkerStatus> {
        let def = self.catalog.get(worker)?;
        let process = self.registry.get(worker).filter(|p| p.is_running());
        Ok(WorkerStatus {
            id: def.id,
            name: def.name.clone(),
            kind: def.kind,
            running: process.is_some(),
            pid: process.map(|p| p.pid()),
        })
    }

    pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.catalog
            .iter()
            .filter_map(|d| self.worker_status(d.id).ok())
            .collect()
    }

    pub fn admin_token(&self, worker: WorkerId) -> Option<String> {
        self.tokens.get(worker)
    }

    // ---- tasks ------------------------------------------------------------

    pub fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        self.store.get_all()
    }

    pub fn get_task(&self, id: TaskId) -> Result<ScheduledTask> {
        self.store.get_by_id(id)
    }

    /// Validate, persist and (if enabled) schedule a new task.
    pub fn create_task(&self, task: ScheduledTask) -> Result<ScheduledTask> {
        validate_task(&task)?;
        let created = self.store.create(task)?;
        self.scheduler.reload_task(created.id)?;
        info!(task_id = created.id, name = %created.name, "task created");
        self.store.get_by_id(created.id)
    }

    /// Replace the definition fields; run bookkeeping is kept from the store.
    pub fn update_task(&self, task: &ScheduledTask) -> Result<ScheduledTask> {
        validate_task(task)?;
        let current = self.store.get_by_id(task.id)?;

        let mut next = current.clone();
        next.name = task.name.clone();
        next.task_type = task.task_type.clone();
        next.enabled = task.enabled;
        next.cron_expression = task.cron_expression.clone();
        next.params = task.params.clone();
        next.description = task.description.clone();

        self.store.update(&next)?;
        self.scheduler.reload_task(task.id)?;
        self.store.get_by_id(task.id)
    }

    pub fn delete_task(&self, id: TaskId) -> Result<()> {
        self.scheduler.remove_task(id);
        self.store.delete(id)?;
        info!(task_id = id, "task deleted");
        Ok(())
    }

    pub fn set_task_enabled(&self, id: TaskId, enabled: bool) -> Result<ScheduledTask> {
        let mut task = self.store.get_by_id(id)?;
        task.enabled = enabled;
        self.store.update(&task)?;
        self.scheduler.reload_task(id)?;
        info!(task_id = id, enabled, "task toggled");
        self.store.get_by_id(id)
    }

    /// Trigger an execution in the background. `AlreadyExecuting` if one is
    /// in flight.
    pub fn run_task_now(&self, id: TaskId) -> Result<()> {
        self.scheduler.run_now(id)
    }

    /// Newest first; `limit == 0` returns every row.
    pub fn task_logs(&self, id: TaskId, limit: usize) -> Result<Vec<TaskExecutionLog>> {
        self.store.get_by_id(id)?;
        self.store.get_logs(id, limit)
    }
}

/// Reject a definition the scheduler or executor could never run.
pub fn validate_task(task: &ScheduledTask) -> Result<()> {
    if task.name.trim().is_empty() {
        return Err(WardenError::InvalidParams("task name must not be empty".to_string()));
    }
    let task_type: TaskType = task
        .task_type
        .parse()
        .map_err(WardenError::UnknownTaskType)?;
    TaskParams::parse(task_type, &task.params)?;
    Schedule::parse(&task.cron_expression)?;
    Ok(())
}
