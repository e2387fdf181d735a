// src/workers/launcher.rs

//! Start / stop / restart a worker from its catalog definition.

use std::fs::{self, OpenOptions};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use crate::config::ConfigFile;
use crate::config::model::{DEFAULT_OUTPUT_BUFFER_LINES, DEFAULT_RESTART_DELAY};
use crate::errors::Result;
use crate::process::{ManagedProcess, ProcessRegistry, ShutdownTimings, SpawnSpec};
use crate::types::WorkerId;
use crate::workers::catalog::WorkerCatalog;
use crate::workers::tokens::TokenLedger;

#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub buffer_lines: usize,
    pub timings: ShutdownTimings,
    /// Pause between stop and start on restart.
    pub restart_delay: Duration,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            buffer_lines: DEFAULT_OUTPUT_BUFFER_LINES,
            timings: ShutdownTimings::default(),
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

impl LaunchSettings {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            buffer_lines: cfg.supervisor.output_buffer_lines,
            timings: cfg.shutdown.clone(),
            restart_delay: cfg.supervisor.restart_delay,
        }
    }
}

pub struct WorkerLauncher {
    catalog: Arc<WorkerCatalog>,
    registry: Arc<ProcessRegistry>,
    tokens: Arc<TokenLedger>,
    settings: LaunchSettings,
}

impl WorkerLauncher {
    pub fn new(
        catalog: Arc<WorkerCatalog>,
        registry: Arc<ProcessRegistry>,
        tokens: Arc<TokenLedger>,
        settings: LaunchSettings,
    ) -> Self {
        Self {
            catalog,
            registry,
            tokens,
            settings,
        }
    }

    pub fn catalog(&self) -> &Arc<WorkerCatalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Open the worker's append-only log and register a freshly spawned process.
    pub fn start(&self, worker: WorkerId) -> Result<Arc<ManagedProcess>> {
        let def = self.catalog.get(worker)?;

        fs::create_dir_all(def.log_dir())?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(def.log_file())?;

        let mut spec = SpawnSpec::new(def.id, def.command.clone())
            .args(def.args.clone())
            .kind(def.kind)
            .pty(def.pty)
            .log_sink(Box::new(log))
            .token_sink(self.tokens.clone())
            .buffer_lines(self.settings.buffer_lines)
            .timings(self.settings.timings.clone());
        spec.env = def.env.clone();
        if let Some(dir) = &def.working_dir {
            spec = spec.working_dir(dir.clone());
        }
        if let Some(marker) = &def.token_marker {
            spec = spec.token_marker(marker.clone());
        }

        // A new process means any previously captured token is stale.
        if !self.registry.is_running(worker) {
            self.tokens.forget(worker);
        }
        self.registry.start(spec)
    }

    pub async fn stop(&self, worker: WorkerId) -> Result<()> {
        self.registry.stop(worker).await
    }

    /// Stop if running, wait the restart delay, start again.
    pub async fn restart(&self, worker: WorkerId) -> Result<Arc<ManagedProcess>> {
        // Fail before touching the running process if the definition is gone.
        self.catalog.get(worker)?;

        if self.registry.is_running(worker) {
            info!(worker, "restarting worker");
            self.registry.stop(worker).await?;
            sleep(self.settings.restart_delay).await;
        }

        self.start(worker)
    }
}
