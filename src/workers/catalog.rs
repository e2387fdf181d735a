// src/workers/catalog.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{ConfigFile, WorkerDefinition};
use crate::errors::{Result, WardenError};
use crate::exec::WorkerDirectory;
use crate::types::{GLOBAL_SCOPE, WorkerId};

/// Every worker the supervisor knows how to launch, plus the shared
/// directories that the maintenance handlers operate on.
#[derive(Debug, Clone)]
pub struct WorkerCatalog {
    workers: BTreeMap<WorkerId, WorkerDefinition>,
    backup_dir: PathBuf,
    log_dir: PathBuf,
}

impl WorkerCatalog {
    pub fn new(backup_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            workers: BTreeMap::new(),
            backup_dir: backup_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            workers: cfg.workers.clone(),
            backup_dir: cfg.supervisor.backup_dir.clone(),
            log_dir: cfg.supervisor.log_dir.clone(),
        }
    }

    pub fn with_worker(mut self, definition: WorkerDefinition) -> Self {
        self.workers.insert(definition.id, definition);
        self
    }

    pub fn get(&self, worker: WorkerId) -> Result<&WorkerDefinition> {
        self.workers
            .get(&worker)
            .ok_or(WardenError::WorkerNotFound(worker))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerDefinition> {
        self.workers.values()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// `<backup_dir>` for the global scope, `<backup_dir>/worker-<id>` otherwise.
    pub fn backup_root(&self, worker: WorkerId) -> PathBuf {
        if worker == GLOBAL_SCOPE {
            self.backup_dir.clone()
        } else {
            self.backup_dir.join(format!("worker-{worker}"))
        }
    }

    /// `<log_dir>` for the global scope, the worker's own log dir otherwise.
    pub fn log_root(&self, worker: WorkerId) -> Result<PathBuf> {
        if worker == GLOBAL_SCOPE {
            Ok(self.log_dir.clone())
        } else {
            Ok(self.get(worker)?.log_dir())
        }
    }
}

impl WorkerDirectory for WorkerCatalog {
    fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }
}
