// src/tasks/json_store.rs

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::errors::{Result, WardenError};
use crate::tasks::model::{ScheduledTask, TaskExecutionLog, TaskId};
use crate::tasks::store::{StoreState, TaskStore};

/// Task store backed by a single JSON file.
///
/// The file is the only copy of the state. `warden run` and the `warden task`
/// commands are separate processes sharing it, so every call takes an
/// advisory lock on `<file>.lock` and reads the file afresh. Mutations hold
/// the lock exclusively across read, change and write, so concurrent writers
/// never drop each other's rows. Writes go to `<file>.tmp` and are renamed
/// over the real file.
pub struct JsonTaskStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonTaskStore {
    /// Open `path`, starting empty if the file does not exist yet. A file that
    /// does not parse is rejected here rather than on first use.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = Self {
            lock_path: sibling(&path, ".lock"),
            path,
        };
        store.read(|_| ())?;

        debug!(path = %store.path.display(), "opened task store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, arg: FlockArg) -> Result<Flock<File>> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        Flock::lock(file, arg).map_err(|(_, errno)| WardenError::IoError(errno.into()))
    }

    fn load(&self) -> Result<StoreState> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(StoreState::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn read<T>(&self, op: impl FnOnce(&StoreState) -> T) -> Result<T> {
        let _lock = self.lock(FlockArg::LockShared)?;
        Ok(op(&self.load()?))
    }

    /// Apply `op` to the current on-disk state and write the result back,
    /// all under the exclusive lock. Nothing is written if `op` fails.
    fn mutate<T>(&self, op: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let _lock = self.lock(FlockArg::LockExclusive)?;
        let mut state = self.load()?;
        let value = op(&mut state)?;
        write_atomically(&self.path, &state)?;
        Ok(value)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_atomically(path: &Path, state: &StoreState) -> Result<()> {
    let tmp = sibling(path, ".tmp");

    let bytes = serde_json::to_vec_pretty(state)?;
    let mut file = File::create(&tmp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

impl TaskStore for JsonTaskStore {
    fn get_all(&self) -> Result<Vec<ScheduledTask>> {
        self.read(StoreState::all)
    }

    fn get_by_id(&self, id: TaskId) -> Result<ScheduledTask> {
        self.read(|state| state.get(id))?
    }

    fn get_enabled(&self) -> Result<Vec<ScheduledTask>> {
        self.read(StoreState::enabled)
    }

    fn create(&self, task: ScheduledTask) -> Result<ScheduledTask> {
        self.mutate(|state| Ok(state.create(task)))
    }

    fn update(&self, task: &ScheduledTask) -> Result<ScheduledTask> {
        self.mutate(|state| state.update(task))
    }

    fn delete(&self, id: TaskId) -> Result<()> {
        self.mutate(|state| state.delete(id))
    }

    fn create_log(&self, log: TaskExecutionLog) -> Result<TaskExecutionLog> {
        self.mutate(|state| Ok(state.create_log(log)))
    }

    fn update_log(&self, log: &TaskExecutionLog) -> Result<()> {
        self.mutate(|state| state.update_log(log))
    }

    fn get_logs(&self, task_id: TaskId, limit: usize) -> Result<Vec<TaskExecutionLog>> {
        self.read(|state| state.logs(task_id, limit))
    }

    fn delete_logs(&self, task_id: TaskId) -> Result<usize> {
        self.mutate(|state| Ok(state.delete_logs(task_id)))
    }
}
