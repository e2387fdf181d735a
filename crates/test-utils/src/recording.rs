use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use warden::exec::{
    BackupHandler, BoxFuture, BroadcastHandler, CleanupBackupHandler, CleanupLogHandler,
    CustomCommandHandler, RestartHandler, TaskHandlers, WorkerDirectory,
};
use warden::types::WorkerId;

/// One collaborator call as seen by [`RecordingHandlers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Backup { worker: WorkerId, kind: String, note: String },
    Restart(WorkerId),
    CleanupBackup { worker: WorkerId, days: u32 },
    CleanupLog { worker: WorkerId, days: u32 },
    Broadcast { worker: WorkerId, message: String },
    Command { worker: WorkerId, command: String },
}

/// A fake handler set that:
/// - records every call in order
/// - fails for workers listed via [`RecordingHandlers::fail_for`]
/// - optionally sleeps before answering, to hold an execution in flight.
#[derive(Default)]
pub struct RecordingHandlers {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<WorkerId>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingHandlers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, worker: WorkerId) {
        self.failing.lock().unwrap().insert(worker);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn handlers(self: &Arc<Self>) -> TaskHandlers {
        TaskHandlers::uniform(Arc::clone(self))
    }

    async fn record(&self, worker: WorkerId, call: Call) -> anyhow::Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().unwrap().push(call);

        if self.failing.lock().unwrap().contains(&worker) {
            return Err(anyhow!("simulated failure for worker {worker}"));
        }
        Ok(())
    }
}

impl BackupHandler for RecordingHandlers {
    fn create_backup<'a>(
        &'a self,
        worker: WorkerId,
        kind: &'a str,
        note: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.record(
            worker,
            Call::Backup {
                worker,
                kind: kind.to_string(),
                note: note.to_string(),
            },
        ))
    }
}

impl RestartHandler for RecordingHandlers {
    fn restart_worker(&self, worker: WorkerId) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.record(worker, Call::Restart(worker)))
    }
}

impl CleanupBackupHandler for RecordingHandlers {
    fn cleanup_old_backups(
        &self,
        worker: WorkerId,
        days_to_keep: u32,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.record(
            worker,
            Call::CleanupBackup {
                worker,
                days: days_to_keep,
            },
        ))
    }
}

impl CleanupLogHandler for RecordingHandlers {
    fn cleanup_old_logs(
        &self,
        worker: WorkerId,
        days_to_keep: u32,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.record(
            worker,
            Call::CleanupLog {
                worker,
                days: days_to_keep,
            },
        ))
    }
}

impl BroadcastHandler for RecordingHandlers {
    fn send_broadcast<'a>(
        &'a self,
        worker: WorkerId,
        message: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.record(
            worker,
            Call::Broadcast {
                worker,
                message: message.to_string(),
            },
        ))
    }
}

impl CustomCommandHandler for RecordingHandlers {
    fn execute_command<'a>(
        &'a self,
        worker: WorkerId,
        command: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.record(
            worker,
            Call::Command {
                worker,
                command: command.to_string(),
            },
        ))
    }
}

/// Fixed list of worker identities.
pub struct StaticWorkers(pub Vec<WorkerId>);

impl WorkerDirectory for StaticWorkers {
    fn worker_ids(&self) -> Vec<WorkerId> {
        self.0.clone()
    }
}

/// In-memory log sink whose contents stay readable after the process handle
/// has taken ownership of the writer.
#[derive(Clone, Default)]
pub struct SharedLog(Arc<Mutex<Vec<u8>>>);

impl SharedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> Box<dyn std::io::Write + Send> {
        Box::new(self.clone())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
