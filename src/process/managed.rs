// src/process/managed.rs

//! One supervised worker process.
//!
//! Reads and writes never share a lock: the reader feeds the
//! [`OutputPipeline`] (ring buffer behind its own `RwLock`), while commands go
//! through the channel mutex. `stop` is serialized by a third lock so two
//! concurrent stops do not run two shutdown protocols against one pid.
//!
//! Liveness is never cached. While a stop is in progress the process keeps
//! reporting as running, and [`ManagedProcess::is_stopping`] lets the
//! registry refuse a second start for the same identity.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::{Result, WardenError};
use crate::process::channel::{self, CommandChannel, ExitReport, ExitWatch};
use crate::process::output::{LogSink, OutputPipeline};
use crate::process::shutdown::{self, ShutdownProtocol, ShutdownTimings, StopTarget};
use crate::process::token::AdminTokenSink;
use crate::types::{WorkerId, WorkerKind};

pub const DEFAULT_BUFFER_LINES: usize = 1000;

/// Everything needed to launch one worker.
pub struct SpawnSpec {
    pub worker: WorkerId,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub kind: WorkerKind,
    pub pty: bool,
    pub log_sink: Option<LogSink>,
    pub token_sink: Option<Arc<dyn AdminTokenSink>>,
    /// Overrides the kind's default setup-code marker.
    pub token_marker: Option<String>,
    pub buffer_lines: usize,
    pub timings: ShutdownTimings,
}

impl SpawnSpec {
    pub fn new(worker: WorkerId, command: impl Into<String>) -> Self {
        Self {
            worker,
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            kind: WorkerKind::default(),
            pty: false,
            log_sink: None,
            token_sink: None,
            token_marker: None,
            buffer_lines: DEFAULT_BUFFER_LINES,
            timings: ShutdownTimings::default(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn kind(mut self, kind: WorkerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn pty(mut self, pty: bool) -> Self {
        self.pty = pty;
        self
    }

    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn token_sink(mut self, sink: Arc<dyn AdminTokenSink>) -> Self {
        self.token_sink = Some(sink);
        self
    }

    pub fn token_marker(mut self, marker: impl Into<String>) -> Self {
        self.token_marker = Some(marker.into());
        self
    }

    pub fn buffer_lines(mut self, lines: usize) -> Self {
        self.buffer_lines = lines;
        self
    }

    pub fn timings(mut self, timings: ShutdownTimings) -> Self {
        self.timings = timings;
        self
    }
}

pub struct ManagedProcess {
    id: WorkerId,
    pid: u32,
    kind: WorkerKind,
    protocol: ShutdownProtocol,
    channel: Mutex<Option<CommandChannel>>,
    output: Arc<OutputPipeline>,
    exit: ExitWatch,
    /// Cleared when a stop begins; commands are refused from then on.
    accepting: AtomicBool,
    stopping: AtomicBool,
    stopped: AtomicBool,
    stop_lock: Mutex<()>,
    timings: ShutdownTimings,
}

impl ManagedProcess {
    /// Launch the worker described by `spec`. Must be called from within a
    /// Tokio runtime: pipe readers and the pipe-mode waiter are Tokio tasks.
    pub fn spawn(mut spec: SpawnSpec) -> Result<Self> {
        let marker = spec
            .token_marker
            .clone()
            .or_else(|| spec.kind.default_token_marker().map(str::to_string));
        let output = Arc::new(OutputPipeline::new(
            spec.worker,
            spec.buffer_lines,
            spec.log_sink.take(),
            marker,
            spec.token_sink.clone(),
        ));

        let spawned = if spec.pty {
            channel::spawn_pty(&spec, Arc::clone(&output))?
        } else {
            channel::spawn_piped(&spec, Arc::clone(&output))?
        };

        info!(
            worker = spec.worker,
            pid = spawned.pid,
            kind = %spec.kind,
            pty = spec.pty,
            command = %spec.command,
            "worker started"
        );

        Ok(Self {
            id: spec.worker,
            pid: spawned.pid,
            kind: spec.kind,
            protocol: ShutdownProtocol::for_kind(spec.kind),
            channel: Mutex::new(Some(spawned.channel)),
            output,
            exit: spawned.exit,
            accepting: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_lock: Mutex::new(()),
            timings: spec.timings,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// PID captured at spawn time. Meaningless once stopped.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Probes the OS on every call. A worker in the middle of a stop is still
    /// running until its process is actually gone.
    pub fn is_running(&self) -> bool {
        self.exit.borrow().is_none() && shutdown::pid_alive(self.pid)
    }

    /// A shutdown protocol is currently running against this process.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn exit_report(&self) -> Option<ExitReport> {
        *self.exit.borrow()
    }

    /// Resolves once the process has exited (for any reason).
    pub async fn wait_exit(&self) -> Option<ExitReport> {
        let mut exit = self.exit.clone();
        let report = match exit.wait_for(Option::is_some).await {
            Ok(report) => *report,
            Err(_) => None,
        };
        report
    }

    /// Write `text` followed by a newline (unless it already ends with one).
    pub async fn send_command(&self, text: &str) -> Result<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(self.unavailable("worker is stopping"));
        }
        if !self.is_running() {
            return Err(self.unavailable("process is not running"));
        }

        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }

        let mut guard = self.channel.lock().await;
        // Re-check under the lock: a stop may have taken the channel meanwhile.
        if !self.accepting.load(Ordering::Acquire) {
            return Err(self.unavailable("worker is stopping"));
        }
        let Some(channel) = guard.as_mut() else {
            return Err(self.unavailable("channel closed"));
        };

        channel
            .write_all(&line, self.timings.write_timeout)
            .await
            .map_err(|e| self.unavailable(&e.to_string()))?;

        debug!(worker = self.id, command = line.trim_end(), "command sent");
        Ok(())
    }

    /// Run the kind's shutdown protocol. Returns once the process is confirmed
    /// gone; `Unkillable` only if SIGKILL did not take.
    pub async fn stop(&self) -> Result<()> {
        // From here on no caller may inject commands.
        self.accepting.store(false, Ordering::Release);

        let _stop = self.stop_lock.lock().await;
        if self.stopped.load(Ordering::Acquire) {
            return Ok(());
        }

        self.stopping.store(true, Ordering::Release);
        let _stopping = StoppingMark(&self.stopping);
        let channel = self.channel.lock().await.take();

        if self.exit.borrow().is_some() || !shutdown::pid_alive(self.pid) {
            debug!(worker = self.id, pid = self.pid, "worker already exited");
            self.stopped.store(true, Ordering::Release);
            return Ok(());
        }

        let target = StopTarget {
            worker: self.id,
            pid: self.pid,
            channel,
            exit: self.exit.clone(),
            timings: &self.timings,
        };
        shutdown::run_protocol(self.protocol, target).await?;

        self.stopped.store(true, Ordering::Release);
        info!(worker = self.id, pid = self.pid, "worker stopped");
        Ok(())
    }

    pub fn output_snapshot(&self) -> String {
        self.output.snapshot()
    }

    pub fn admin_token(&self) -> Option<String> {
        self.output.captured_token()
    }

    fn unavailable(&self, reason: &str) -> WardenError {
        WardenError::ChannelUnavailable {
            worker: self.id,
            reason: reason.to_string(),
        }
    }
}

/// Clears the stopping flag when `stop` returns, whatever the outcome.
struct StoppingMark<'a>(&'a AtomicBool);

impl Drop for StoppingMark<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("kind", &self.kind)
            .field("stopping", &self.stopping.load(Ordering::Relaxed))
            .finish()
    }
}
