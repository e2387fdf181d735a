// src/process/registry.rs

//! Worker identity → live [`ManagedProcess`].
//!
//! The map lock is held only for short, non-async critical sections: the
//! check-spawn-insert in [`ProcessRegistry::start`] and the removal after a
//! confirmed stop. The shutdown protocol itself runs outside the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::errors::{Result, WardenError};
use crate::process::managed::{ManagedProcess, SpawnSpec};
use crate::types::WorkerId;

#[derive(Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<WorkerId, Arc<ManagedProcess>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and register a worker. Fails with `AlreadyRunning` while a live
    /// entry exists for the same identity and with `StopInProgress` while its
    /// shutdown protocol is still running. A dead entry is replaced.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, spec: SpawnSpec) -> Result<Arc<ManagedProcess>> {
        let worker = spec.worker;
        let mut entries = self.lock();

        if let Some(existing) = entries.get(&worker) {
            if existing.is_stopping() {
                return Err(WardenError::StopInProgress(worker));
            }
            if existing.is_running() {
                return Err(WardenError::AlreadyRunning(worker));
            }
            debug!(worker, pid = existing.pid(), "replacing dead registry entry");
        }

        let process = Arc::new(ManagedProcess::spawn(spec)?);
        entries.insert(worker, Arc::clone(&process));
        Ok(process)
    }

    pub fn get(&self, worker: WorkerId) -> Option<Arc<ManagedProcess>> {
        self.lock().get(&worker).cloned()
    }

    pub fn is_running(&self, worker: WorkerId) -> bool {
        self.get(worker).is_some_and(|p| p.is_running())
    }

    /// Stop the worker and drop its entry. The entry stays if the stop fails.
    pub async fn stop(&self, worker: WorkerId) -> Result<()> {
        let process = self.get(worker).ok_or(WardenError::NotRunning(worker))?;

        process.stop().await?;

        let mut entries = self.lock();
        // Only remove the entry we stopped; a fresh start may have replaced it.
        if entries
            .get(&worker)
            .is_some_and(|current| Arc::ptr_eq(current, &process))
        {
            entries.remove(&worker);
        }
        Ok(())
    }

    /// Registered identities, sorted.
    pub fn ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn running_ids(&self) -> Vec<WorkerId> {
        let processes: Vec<Arc<ManagedProcess>> = self.lock().values().cloned().collect();
        let mut ids: Vec<WorkerId> = processes
            .iter()
            .filter(|p| p.is_running())
            .map(|p| p.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Stop every registered worker. Failures are logged and returned, never
    /// short-circuiting the remaining stops.
    pub async fn stop_all(&self) -> Vec<(WorkerId, WardenError)> {
        let mut failures = Vec::new();
        for worker in self.ids() {
            match self.stop(worker).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(worker, error = %e, "failed to stop worker");
                    failures.push((worker, e));
                }
            }
        }
        failures
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkerId, Arc<ManagedProcess>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
