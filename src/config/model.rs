// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::process::ShutdownTimings;
use crate::types::{WorkerId, WorkerKind};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// data_dir = "data"
/// restart_delay = "2s"
///
/// [shutdown]
/// interactive_timeout = "10s"
///
/// [worker.1]
/// name = "survival"
/// kind = "interactive"
/// command = "/srv/game/start.sh"
/// pty = true
/// ```
///
/// All sections are optional. This is the *unvalidated* form; convert with
/// `ConfigFile::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub shutdown: ShutdownSection,

    /// Workers keyed by their numeric identity (`[worker.1]`, `[worker.2]`).
    #[serde(default)]
    pub worker: BTreeMap<String, WorkerConfig>,
}

/// `[supervisor]` section. Paths default to locations under `data_dir`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub task_store: Option<PathBuf>,
    #[serde(default)]
    pub output_buffer_lines: Option<usize>,
    #[serde(default)]
    pub restart_delay: Option<String>,
    /// How often `warden run` re-reads the task store for outside edits.
    #[serde(default)]
    pub task_resync: Option<String>,
}

/// `[shutdown]` section. Durations use the `"10s"` / `"500ms"` format.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownSection {
    #[serde(default)]
    pub interactive_timeout: Option<String>,
    #[serde(default)]
    pub line_timeout: Option<String>,
    #[serde(default)]
    pub bare_timeout: Option<String>,
    #[serde(default)]
    pub save_delay: Option<String>,
    #[serde(default)]
    pub liveness_polls: Option<u32>,
    #[serde(default)]
    pub poll_interval: Option<String>,
    #[serde(default)]
    pub kill_verify: Option<String>,
    #[serde(default)]
    pub write_timeout: Option<String>,
}

/// `[worker.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub kind: WorkerKind,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Attach a pseudo-terminal instead of pipes.
    #[serde(default)]
    pub pty: bool,

    /// Worker data directory; default `<data_dir>/workers/worker-<id>`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Overrides the kind's default setup-code marker.
    #[serde(default)]
    pub token_marker: Option<String>,

    /// Start with `warden run`.
    #[serde(default)]
    pub autostart: bool,
}

pub const DEFAULT_OUTPUT_BUFFER_LINES: usize = 1000;
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_TASK_RESYNC: Duration = Duration::from_secs(5);

/// Validated, fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSettings,
    pub shutdown: ShutdownTimings,
    pub workers: BTreeMap<WorkerId, WorkerDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Log directory for the global scope (identity 0).
    pub log_dir: PathBuf,
    pub task_store: PathBuf,
    pub output_buffer_lines: usize,
    pub restart_delay: Duration,
    pub task_resync: Duration,
}

impl SupervisorSettings {
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            backup_dir: data_dir.join("backups"),
            log_dir: data_dir.join("logs"),
            task_store: data_dir.join("tasks.json"),
            data_dir,
            output_buffer_lines: DEFAULT_OUTPUT_BUFFER_LINES,
            restart_delay: DEFAULT_RESTART_DELAY,
            task_resync: DEFAULT_TASK_RESYNC,
        }
    }
}

/// One launchable worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDefinition {
    pub id: WorkerId,
    pub name: String,
    pub kind: WorkerKind,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub pty: bool,
    pub data_dir: PathBuf,
    pub token_marker: Option<String>,
    pub autostart: bool,
}

impl WorkerDefinition {
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Append-only file receiving the worker's filtered output.
    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("server.log")
    }
}
