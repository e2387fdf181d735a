#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use warden::config::{ConfigFile, RawConfigFile, WorkerConfig, WorkerDefinition};
use warden::process::ShutdownTimings;
use warden::tasks::ScheduledTask;
use warden::types::{TaskType, WorkerId, WorkerKind};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    /// Put every default directory under `dir` (usually a tempdir).
    pub fn data_dir(mut self, dir: &Path) -> Self {
        self.config.supervisor.data_dir = Some(dir.to_path_buf());
        self
    }

    pub fn restart_delay(mut self, delay: &str) -> Self {
        self.config.supervisor.restart_delay = Some(delay.to_string());
        self
    }

    pub fn buffer_lines(mut self, lines: usize) -> Self {
        self.config.supervisor.output_buffer_lines = Some(lines);
        self
    }

    /// Short ceilings so shutdown scenarios finish quickly.
    pub fn fast_shutdown(mut self) -> Self {
        let s = &mut self.config.shutdown;
        s.interactive_timeout = Some("1s".to_string());
        s.line_timeout = Some("1s".to_string());
        s.bare_timeout = Some("1s".to_string());
        s.save_delay = Some("100ms".to_string());
        s.poll_interval = Some("100ms".to_string());
        s.kill_verify = Some("1s".to_string());
        s.write_timeout = Some("500ms".to_string());
        self
    }

    pub fn with_worker(mut self, id: WorkerId, worker: WorkerConfig) -> Self {
        self.config.worker.insert(id.to_string(), worker);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WorkerConfig`.
pub struct WorkerConfigBuilder {
    worker: WorkerConfig,
}

impl WorkerConfigBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            worker: WorkerConfig {
                name: None,
                kind: WorkerKind::Bare,
                command: command.to_string(),
                args: vec![],
                working_dir: None,
                env: BTreeMap::new(),
                pty: false,
                data_dir: None,
                token_marker: None,
                autostart: false,
            },
        }
    }

    /// `/bin/sh -c <script>`.
    pub fn shell(script: &str) -> Self {
        Self::new("/bin/sh").args(&["-c", script])
    }

    pub fn name(mut self, name: &str) -> Self {
        self.worker.name = Some(name.to_string());
        self
    }

    pub fn kind(mut self, kind: WorkerKind) -> Self {
        self.worker.kind = kind;
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.worker.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn pty(mut self, pty: bool) -> Self {
        self.worker.pty = pty;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.worker.data_dir = Some(dir.into());
        self
    }

    pub fn token_marker(mut self, marker: &str) -> Self {
        self.worker.token_marker = Some(marker.to_string());
        self
    }

    pub fn autostart(mut self) -> Self {
        self.worker.autostart = true;
        self
    }

    pub fn build(self) -> WorkerConfig {
        self.worker
    }
}

/// A resolved definition for catalog-level tests.
pub fn worker_definition(id: WorkerId, data_dir: &Path) -> WorkerDefinition {
    WorkerDefinition {
        id,
        name: format!("worker-{id}"),
        kind: WorkerKind::Bare,
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), "sleep 30".to_string()],
        working_dir: None,
        env: BTreeMap::new(),
        pty: false,
        data_dir: data_dir.to_path_buf(),
        token_marker: None,
        autostart: false,
    }
}

/// Timings short enough for tests while keeping the protocol order intact.
pub fn fast_timings() -> ShutdownTimings {
    ShutdownTimings {
        interactive_wait: Duration::from_secs(1),
        line_wait: Duration::from_secs(1),
        bare_wait: Duration::from_secs(1),
        save_delay: Duration::from_millis(100),
        liveness_polls: 3,
        poll_interval: Duration::from_millis(100),
        kill_verify: Duration::from_secs(1),
        write_timeout: Duration::from_millis(500),
    }
}

/// Builder for `ScheduledTask`.
pub struct TaskBuilder {
    task: ScheduledTask,
}

impl TaskBuilder {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task: ScheduledTask::new(
                format!("{task_type} task"),
                task_type.as_str(),
                "0 0 3 * * *",
                Value::Object(Default::default()),
            ),
        }
    }

    /// For rows whose type string is not a known `TaskType`.
    pub fn raw_type(task_type: &str) -> Self {
        let mut builder = Self::new(TaskType::Backup);
        builder.task.task_type = task_type.to_string();
        builder
    }

    pub fn id(mut self, id: u64) -> Self {
        self.task.id = id;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn cron(mut self, expr: &str) -> Self {
        self.task.cron_expression = expr.to_string();
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.task.params = params;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.enabled = false;
        self
    }

    pub fn build(self) -> ScheduledTask {
        self.task
    }
}
