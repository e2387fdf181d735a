// src/process/shutdown.rs

//! Graceful-shutdown protocols.
//!
//! Each [`WorkerKind`] maps to one [`ShutdownProtocol`], chosen when the
//! process is spawned. Every protocol ends in one of two places: the process
//! is confirmed gone, or a SIGKILL was sent and the process still answers the
//! liveness check, in which case the caller gets `Unkillable`.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::errors::{Result, WardenError};
use crate::process::channel::{CommandChannel, ExitWatch};
use crate::types::{WorkerId, WorkerKind};

/// Ceilings and delays used while talking to and stopping a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownTimings {
    pub interactive_wait: Duration,
    pub line_wait: Duration,
    pub bare_wait: Duration,
    /// Pause between `save` and `exit` for line-oriented workers.
    pub save_delay: Duration,
    pub liveness_polls: u32,
    pub poll_interval: Duration,
    /// How long to wait for the exit to be observed after SIGKILL.
    pub kill_verify: Duration,
    /// Ceiling for one write to the worker's input.
    pub write_timeout: Duration,
}

impl Default for ShutdownTimings {
    fn default() -> Self {
        Self {
            interactive_wait: Duration::from_secs(10),
            line_wait: Duration::from_secs(5),
            bare_wait: Duration::from_secs(5),
            save_delay: Duration::from_secs(2),
            liveness_polls: 3,
            poll_interval: Duration::from_secs(1),
            kill_verify: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownProtocol {
    /// Close the channel, SIGTERM, wait, re-poll, then SIGKILL.
    HangupThenTerminate,
    /// `save`, pause, `exit`, close input, wait, then SIGKILL.
    SaveAndExit,
    /// SIGTERM, wait, then SIGKILL.
    Terminate,
}

impl ShutdownProtocol {
    pub fn for_kind(kind: WorkerKind) -> Self {
        match kind {
            WorkerKind::Interactive => ShutdownProtocol::HangupThenTerminate,
            WorkerKind::Line => ShutdownProtocol::SaveAndExit,
            WorkerKind::Bare => ShutdownProtocol::Terminate,
        }
    }
}

/// Everything a protocol needs to bring one process down.
pub(crate) struct StopTarget<'a> {
    pub worker: WorkerId,
    pub pid: u32,
    pub channel: Option<CommandChannel>,
    pub exit: ExitWatch,
    pub timings: &'a ShutdownTimings,
}

impl StopTarget<'_> {
    fn alive(&self) -> bool {
        self.exit.borrow().is_none() && pid_alive(self.pid)
    }

    /// Wait up to `ceiling` for the exit to be observed. Returns `true` once the
    /// process is gone.
    async fn wait_for_exit(&mut self, ceiling: Duration) -> bool {
        let observed = matches!(
            timeout(ceiling, self.exit.wait_for(Option::is_some)).await,
            Ok(Ok(_))
        );
        // Waiter gone without reporting, or the ceiling passed: ask the OS.
        observed || !self.alive()
    }

    fn terminate(&self) {
        if let Err(e) = send_signal(self.pid, Signal::SIGTERM) {
            debug!(worker = self.worker, pid = self.pid, error = %e, "SIGTERM not delivered");
        }
    }

    async fn force_kill(&mut self) -> Result<()> {
        warn!(worker = self.worker, pid = self.pid, "graceful shutdown timed out; sending SIGKILL");
        if let Err(e) = send_signal(self.pid, Signal::SIGKILL) {
            debug!(worker = self.worker, pid = self.pid, error = %e, "SIGKILL not delivered");
        }

        let verify = self.timings.kill_verify;
        if self.wait_for_exit(verify).await {
            info!(worker = self.worker, pid = self.pid, "worker killed");
            Ok(())
        } else {
            Err(WardenError::Unkillable {
                worker: self.worker,
                pid: self.pid,
            })
        }
    }

    async fn write(&mut self, text: &str) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if let Err(e) = channel.write_all(text, self.timings.write_timeout).await {
            warn!(worker = self.worker, command = text.trim_end(), error = %e, "failed to write shutdown command");
        }
    }
}

pub(crate) async fn run_protocol(protocol: ShutdownProtocol, mut target: StopTarget<'_>) -> Result<()> {
    debug!(worker = target.worker, pid = target.pid, ?protocol, "stopping worker");

    match protocol {
        ShutdownProtocol::HangupThenTerminate => {
            target.channel = None;
            target.terminate();

            let ceiling = target.timings.interactive_wait;
            if !target.wait_for_exit(ceiling).await {
                return target.force_kill().await;
            }

            // Exit observed, but the pid may still answer for a moment.
            for _ in 0..target.timings.liveness_polls {
                if !target.alive() {
                    return Ok(());
                }
                sleep(target.timings.poll_interval).await;
            }
            if target.alive() {
                return target.force_kill().await;
            }
            Ok(())
        }
        ShutdownProtocol::SaveAndExit => {
            target.write("save\n").await;
            sleep(target.timings.save_delay).await;
            target.write("exit\n").await;
            target.channel = None;

            let ceiling = target.timings.line_wait;
            if target.wait_for_exit(ceiling).await {
                Ok(())
            } else {
                target.force_kill().await
            }
        }
        ShutdownProtocol::Terminate => {
            target.terminate();

            let ceiling = target.timings.bare_wait;
            if target.wait_for_exit(ceiling).await {
                Ok(())
            } else {
                target.force_kill().await
            }
        }
    }
}

pub(crate) fn send_signal(pid: u32, signal: Signal) -> nix::Result<()> {
    let raw = i32::try_from(pid).map_err(|_| Errno::EINVAL)?;
    kill(Pid::from_raw(raw), signal)
}

/// Signal-zero liveness check. `EPERM` still means the pid exists.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
