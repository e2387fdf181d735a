// src/exec/handlers.rs

//! Default handlers backed by the worker catalog, the launcher and the
//! process registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use chrono::Local;
use tracing::{debug, info};

use crate::errors::WardenError;
use crate::exec::backend::{
    BackupHandler, BoxFuture, BroadcastHandler, CleanupBackupHandler, CleanupLogHandler,
    CustomCommandHandler, RestartHandler,
};
use crate::exec::retention::{PruneTarget, prune_older_than};
use crate::process::{ManagedProcess, ProcessRegistry};
use crate::types::WorkerId;
use crate::workers::{WorkerCatalog, WorkerLauncher};

pub struct WorkerHandlers {
    catalog: Arc<WorkerCatalog>,
    launcher: Arc<WorkerLauncher>,
    registry: Arc<ProcessRegistry>,
}

impl WorkerHandlers {
    pub fn new(launcher: Arc<WorkerLauncher>) -> Self {
        Self {
            catalog: Arc::clone(launcher.catalog()),
            registry: Arc::clone(launcher.registry()),
            launcher,
        }
    }

    fn running(&self, worker: WorkerId) -> anyhow::Result<Arc<ManagedProcess>> {
        self.registry
            .get(worker)
            .filter(|p| p.is_running())
            .ok_or_else(|| WardenError::NotRunning(worker).into())
    }
}

impl BackupHandler for WorkerHandlers {
    fn create_backup<'a>(
        &'a self,
        worker: WorkerId,
        kind: &'a str,
        note: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let def = self.catalog.get(worker)?;
            let source = def.data_dir.clone();
            if !source.is_dir() {
                bail!("data directory {} does not exist", source.display());
            }

            let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
            let folder = format!("{}_{}_{}", sanitize(&def.name), stamp, sanitize(kind));
            let root = self.catalog.backup_root(worker);
            let note = note.trim().to_string();

            let dest = tokio::task::spawn_blocking(move || {
                write_backup(&source, &root, &folder, &note)
            })
            .await
            .context("backup worker panicked")??;

            info!(worker, dest = %dest.display(), "backup created");
            Ok(())
        })
    }
}

impl RestartHandler for WorkerHandlers {
    fn restart_worker(&self, worker: WorkerId) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let process = self.launcher.restart(worker).await?;
            info!(worker, pid = process.pid(), "worker restarted by task");
            Ok(())
        })
    }
}

impl CleanupBackupHandler for WorkerHandlers {
    fn cleanup_old_backups(
        &self,
        worker: WorkerId,
        days_to_keep: u32,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let dir = self.catalog.backup_root(worker);
            prune_older_than(dir, days_to_keep, PruneTarget::AnyEntry).await?;
            Ok(())
        })
    }
}

impl CleanupLogHandler for WorkerHandlers {
    fn cleanup_old_logs(
        &self,
        worker: WorkerId,
        days_to_keep: u32,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let dir = self.catalog.log_root(worker)?;
            prune_older_than(dir, days_to_keep, PruneTarget::LogFiles).await?;
            Ok(())
        })
    }
}

impl BroadcastHandler for WorkerHandlers {
    fn send_broadcast<'a>(
        &'a self,
        worker: WorkerId,
        message: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let process = self.running(worker)?;
            let command = process
                .kind()
                .broadcast_command(message)
                .ok_or_else(|| anyhow!("{} workers do not support broadcasts", process.kind()))?;
            process.send_command(&command).await?;
            debug!(worker, "broadcast delivered");
            Ok(())
        })
    }
}

impl CustomCommandHandler for WorkerHandlers {
    fn execute_command<'a>(
        &'a self,
        worker: WorkerId,
        command: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let process = self.running(worker)?;
            process.send_command(command).await?;
            Ok(())
        })
    }
}

/// Copy `source` into a fresh `<root>/<folder>` (suffixed if the name is
/// taken) and drop a `NOTE.txt` next to the data when a note is given.
fn write_backup(source: &Path, root: &Path, folder: &str, note: &str) -> anyhow::Result<PathBuf> {
    let mut dest = root.join(folder);
    let mut attempt = 1;
    while dest.exists() {
        attempt += 1;
        dest = root.join(format!("{folder}-{attempt}"));
    }

    if dest.starts_with(source) {
        bail!(
            "backup destination {} is inside the data directory {}",
            dest.display(),
            source.display()
        );
    }

    fs::create_dir_all(&dest).with_context(|| format!("creating {}", dest.display()))?;
    copy_dir(source, &dest)?;

    if !note.is_empty() {
        fs::write(dest.join("NOTE.txt"), format!("{note}\n"))
            .with_context(|| format!("writing note into {}", dest.display()))?;
    }

    Ok(dest)
}

fn copy_dir(from: &Path, to: &Path) -> anyhow::Result<()> {
    for entry in fs::read_dir(from).with_context(|| format!("reading {}", from.display()))? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = to.join(entry.file_name());

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copying {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "backup".to_string()
    } else {
        cleaned
    }
}
