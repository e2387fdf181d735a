// src/process/channel.rs

//! Spawning a worker and wiring its communication channel.
//!
//! Two modes:
//! - PTY (`portable-pty`): one full-duplex channel, stdout and stderr arrive
//!   combined. Reads are blocking, so a dedicated thread drains the master.
//! - Pipes (`tokio::process`): write-only stdin, stdout and stderr each drained
//!   line by line in their own Tokio task.
//!
//! PTY writes are blocking too, so they run on the blocking pool. Every write,
//! in either mode, is bounded by a ceiling: a worker that stops reading its
//! input cannot wedge a caller.
//!
//! In both modes a waiter owns the child handle, reaps it on exit and
//! publishes the exit through a `watch` channel. Reaping promptly keeps the
//! signal-zero liveness check honest (a zombie would still answer it).

use std::io::{ErrorKind, Read, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::sys::signal::Signal;
use portable_pty::{CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::{Result, WardenError};
use crate::process::managed::SpawnSpec;
use crate::process::output::{OutputPipeline, Stream};
use crate::process::shutdown::send_signal;
use crate::types::WorkerId;

const PTY_READ_CHUNK: usize = 1024;

/// How the worker exited, as observed by the waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub success: bool,
}

pub(crate) type ExitWatch = watch::Receiver<Option<ExitReport>>;

/// Write half of a worker's communication channel.
pub(crate) enum CommandChannel {
    Pty {
        writer: Arc<Mutex<Box<dyn Write + Send>>>,
        // Held so the master side stays open; dropping it hangs up the worker.
        _master: Box<dyn MasterPty + Send>,
    },
    Pipe(ChildStdin),
}

impl CommandChannel {
    /// Write and flush `text`, failing with `TimedOut` after `ceiling`.
    pub(crate) async fn write_all(&mut self, text: &str, ceiling: Duration) -> std::io::Result<()> {
        let write = async {
            match self {
                CommandChannel::Pty { writer, .. } => {
                    let writer = Arc::clone(writer);
                    let bytes = text.as_bytes().to_vec();
                    tokio::task::spawn_blocking(move || {
                        let mut writer = match writer.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        writer.write_all(&bytes)?;
                        writer.flush()
                    })
                    .await
                    .map_err(std::io::Error::other)?
                }
                CommandChannel::Pipe(stdin) => {
                    stdin.write_all(text.as_bytes()).await?;
                    stdin.flush().await
                }
            }
        };

        match timeout(ceiling, write).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("write not accepted within {ceiling:?}"),
            )),
        }
    }
}

pub(crate) struct Spawned {
    pub pid: u32,
    pub channel: CommandChannel,
    pub exit: ExitWatch,
}

pub(crate) fn spawn_pty(spec: &SpawnSpec, output: Arc<OutputPipeline>) -> Result<Spawned> {
    let worker = spec.worker;
    let failed = |reason: String| WardenError::SpawnFailed { worker, reason };

    let pair = native_pty_system()
        .openpty(PtySize {
            rows: 24,
            cols: 200,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| failed(format!("opening PTY: {e}")))?;

    let mut cmd = CommandBuilder::new(&spec.command);
    cmd.args(&spec.args);
    if let Some(dir) = &spec.working_dir {
        cmd.cwd(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| failed(format!("launching '{}': {e}", spec.command)))?;

    // The slave end belongs to the child now; keeping ours open would stop
    // reads from ever seeing EOF.
    drop(pair.slave);

    let Some(pid) = child.process_id() else {
        let _ = child.kill();
        return Err(failed("child exited before reporting a pid".to_string()));
    };

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| failed(format!("cloning PTY reader: {e}")));
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| failed(format!("taking PTY writer: {e}")));
    let (reader, writer) = match (reader, writer) {
        (Ok(r), Ok(w)) => (r, w),
        (Err(e), _) | (_, Err(e)) => {
            let _ = child.kill();
            return Err(e);
        }
    };

    let (exit_tx, exit_rx) = watch::channel(None);

    let waiter = std::thread::Builder::new()
        .name(format!("worker-{worker}-wait"))
        .spawn(move || {
            let report = match child.wait() {
                Ok(status) => ExitReport {
                    code: i32::try_from(status.exit_code()).ok(),
                    success: status.success(),
                },
                Err(e) => {
                    warn!(worker, error = %e, "waiting for PTY child failed");
                    ExitReport {
                        code: None,
                        success: false,
                    }
                }
            };
            debug!(worker, ?report, "worker exited");
            let _ = exit_tx.send(Some(report));
        });
    if let Err(e) = waiter {
        let _ = send_signal(pid, Signal::SIGKILL);
        return Err(failed(format!("starting waiter thread: {e}")));
    }

    let reader_thread = std::thread::Builder::new()
        .name(format!("worker-{worker}-pty"))
        .spawn(move || read_pty(worker, reader, output));
    if let Err(e) = reader_thread {
        let _ = send_signal(pid, Signal::SIGKILL);
        return Err(failed(format!("starting PTY reader thread: {e}")));
    }

    Ok(Spawned {
        pid,
        channel: CommandChannel::Pty {
            writer: Arc::new(Mutex::new(writer)),
            _master: pair.master,
        },
        exit: exit_rx,
    })
}

pub(crate) fn spawn_piped(spec: &SpawnSpec, output: Arc<OutputPipeline>) -> Result<Spawned> {
    let worker = spec.worker;
    let failed = |reason: String| WardenError::SpawnFailed { worker, reason };

    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| failed(format!("launching '{}': {e}", spec.command)))?;

    let Some(pid) = child.id() else {
        return Err(failed("child exited before reporting a pid".to_string()));
    };

    let (Some(stdin), Some(stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        let _ = child.start_kill();
        return Err(failed("child pipes were not captured".to_string()));
    };

    spawn_line_reader(worker, stdout, Stream::Stdout, Arc::clone(&output));
    spawn_line_reader(worker, stderr, Stream::Stderr, output);

    let (exit_tx, exit_rx) = watch::channel(None);
    tokio::spawn(async move {
        let report = match child.wait().await {
            Ok(status) => ExitReport {
                code: status.code(),
                success: status.success(),
            },
            Err(e) => {
                warn!(worker, error = %e, "waiting for child failed");
                ExitReport {
                    code: None,
                    success: false,
                }
            }
        };
        debug!(worker, ?report, "worker exited");
        let _ = exit_tx.send(Some(report));
    });

    Ok(Spawned {
        pid,
        channel: CommandChannel::Pipe(stdin),
        exit: exit_rx,
    })
}

fn spawn_line_reader<R>(worker: WorkerId, pipe: R, stream: Stream, output: Arc<OutputPipeline>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    output.ingest_line(stream, line.trim_end_matches(['\n', '\r']));
                }
                Err(e) => {
                    debug!(worker, ?stream, error = %e, "pipe read failed");
                    break;
                }
            }
        }

        debug!(worker, ?stream, "output reader ended");
    });
}

fn read_pty(worker: WorkerId, mut reader: Box<dyn Read + Send>, output: Arc<OutputPipeline>) {
    let mut buf = [0u8; PTY_READ_CHUNK];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                let text = take_utf8_prefix(&mut pending);
                if !text.is_empty() {
                    output.ingest_chunk(&text);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is how Linux reports a hung-up PTY after the child exits.
                debug!(worker, error = %e, "PTY read ended");
                break;
            }
        }
    }

    if !pending.is_empty() {
        output.ingest_chunk(&String::from_utf8_lossy(&pending));
    }
    output.finish();
    debug!(worker, "PTY reader ended");
}

/// Decode as much of `pending` as forms complete UTF-8, keeping a trailing
/// partial code point for the next read. Invalid bytes are replaced.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}
