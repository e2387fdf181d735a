use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;
use warden::config::{load_and_validate, load_from_str, load_or_default, validate_config};
use warden::errors::WardenError;
use warden::process::ShutdownTimings;
use warden::types::WorkerKind;
use warden_test_utils::builders::{ConfigFileBuilder, WorkerConfigBuilder};

#[test]
fn empty_file_uses_defaults() {
    let cfg = load_from_str("").unwrap();

    assert!(cfg.workers.is_empty());
    assert_eq!(cfg.shutdown, ShutdownTimings::default());
    assert_eq!(cfg.supervisor.data_dir, PathBuf::from("data"));
    assert_eq!(cfg.supervisor.backup_dir, PathBuf::from("data/backups"));
    assert_eq!(cfg.supervisor.log_dir, PathBuf::from("data/logs"));
    assert_eq!(cfg.supervisor.task_store, PathBuf::from("data/tasks.json"));
    assert_eq!(cfg.supervisor.output_buffer_lines, 1000);
    assert_eq!(cfg.supervisor.restart_delay, Duration::from_secs(2));
    assert_eq!(cfg.supervisor.task_resync, Duration::from_secs(5));
    assert_eq!(cfg.shutdown.write_timeout, Duration::from_secs(5));
}

#[test]
fn full_file_is_resolved() {
    let toml = r#"
[supervisor]
data_dir = "/srv/warden"
backup_dir = "/mnt/backups"
output_buffer_lines = 200
restart_delay = "5s"
task_resync = "30s"

[shutdown]
interactive_timeout = "20s"
write_timeout = "2s"
save_delay = "500ms"
liveness_polls = 5

[worker.1]
name = "survival"
kind = "interactive"
command = "/srv/game/start.sh"
args = ["--nogui"]
pty = true
autostart = true

[worker.2]
kind = "line"
command = "/srv/other/run"
token_marker = "code:"

[worker.2.env]
JAVA_OPTS = "-Xmx2G"
"#;
    let cfg = load_from_str(toml).unwrap();

    assert_eq!(cfg.supervisor.backup_dir, PathBuf::from("/mnt/backups"));
    assert_eq!(cfg.supervisor.log_dir, PathBuf::from("/srv/warden/logs"));
    assert_eq!(cfg.supervisor.output_buffer_lines, 200);
    assert_eq!(cfg.supervisor.restart_delay, Duration::from_secs(5));
    assert_eq!(cfg.supervisor.task_resync, Duration::from_secs(30));
    assert_eq!(cfg.shutdown.write_timeout, Duration::from_secs(2));

    assert_eq!(cfg.shutdown.interactive_wait, Duration::from_secs(20));
    assert_eq!(cfg.shutdown.save_delay, Duration::from_millis(500));
    assert_eq!(cfg.shutdown.liveness_polls, 5);
    assert_eq!(cfg.shutdown.line_wait, Duration::from_secs(5));

    let survival = &cfg.workers[&1];
    assert_eq!(survival.name, "survival");
    assert_eq!(survival.kind, WorkerKind::Interactive);
    assert_eq!(survival.args, vec!["--nogui".to_string()]);
    assert!(survival.pty);
    assert!(survival.autostart);
    assert_eq!(
        survival.data_dir,
        PathBuf::from("/srv/warden/workers/worker-1")
    );
    assert_eq!(
        survival.log_file(),
        PathBuf::from("/srv/warden/workers/worker-1/logs/server.log")
    );

    let other = &cfg.workers[&2];
    assert_eq!(other.name, "worker-2");
    assert_eq!(other.kind, WorkerKind::Line);
    assert_eq!(other.token_marker.as_deref(), Some("code:"));
    assert_eq!(other.env.get("JAVA_OPTS").map(String::as_str), Some("-Xmx2G"));
}

#[test]
fn load_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[worker.3]
command = "/bin/true"
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.workers.len(), 1);
    assert_eq!(cfg.workers[&3].kind, WorkerKind::Bare);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_or_default(dir.path().join("Warden.toml")).unwrap();
    assert!(cfg.workers.is_empty());

    let err = load_and_validate(dir.path().join("Warden.toml")).unwrap_err();
    assert!(matches!(err, WardenError::IoError(_)));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = load_from_str("[supervisor]\ndata_directory = \"x\"\n").unwrap_err();
    assert!(matches!(err, WardenError::TomlError(_)));

    let err = load_from_str("[worker.1]\ncommand = \"x\"\nkind = \"daemon\"\n").unwrap_err();
    assert!(matches!(err, WardenError::TomlError(_)));
}

fn config_error(toml: &str) -> String {
    match load_from_str(toml) {
        Err(WardenError::ConfigError(message)) => message,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn worker_keys_must_be_positive_integers() {
    let message = config_error("[worker.survival]\ncommand = \"x\"\n");
    assert!(message.contains("must be a positive integer"), "{message}");

    let message = config_error("[worker.0]\ncommand = \"x\"\n");
    assert!(message.contains("reserved for the global scope"), "{message}");

    let message = config_error("[worker.1]\ncommand = \"x\"\n[worker.01]\ncommand = \"y\"\n");
    assert!(message.contains("more than once"), "{message}");
}

#[test]
fn worker_fields_are_checked() {
    let message = config_error("[worker.1]\ncommand = \"  \"\n");
    assert_eq!(message, "[worker.1].command must not be empty");

    let message = config_error("[worker.1]\ncommand = \"x\"\ntoken_marker = \"\"\n");
    assert!(message.contains("token_marker"), "{message}");
}

#[test]
fn numeric_and_duration_bounds() {
    let message = config_error("[supervisor]\noutput_buffer_lines = 0\n");
    assert!(message.contains("must be >= 1"), "{message}");

    let message = config_error("[shutdown]\nliveness_polls = 0\n");
    assert!(message.contains("liveness_polls"), "{message}");

    let message = config_error("[shutdown]\nline_timeout = \"soon\"\n");
    assert!(message.starts_with("[shutdown].line_timeout:"), "{message}");

    let message = config_error("[supervisor]\nrestart_delay = \"5 days\"\n");
    assert!(message.starts_with("[supervisor].restart_delay:"), "{message}");

    let message = config_error("[supervisor]\ntask_resync = \"0s\"\n");
    assert_eq!(message, "[supervisor].task_resync must be positive");

    let message = config_error("[shutdown]\nwrite_timeout = \"never\"\n");
    assert!(message.starts_with("[shutdown].write_timeout:"), "{message}");
}

#[test]
fn builder_configs_validate() {
    let dir = tempfile::tempdir().unwrap();
    let raw = ConfigFileBuilder::new()
        .data_dir(dir.path())
        .fast_shutdown()
        .with_worker(1, WorkerConfigBuilder::shell("sleep 30").name("a").build())
        .with_worker(
            2,
            WorkerConfigBuilder::shell("cat").kind(WorkerKind::Line).build(),
        )
        .raw();

    validate_config(&raw).unwrap();

    let cfg = warden::config::ConfigFile::try_from(raw).unwrap();
    assert_eq!(cfg.workers.len(), 2);
    assert_eq!(cfg.shutdown.bare_wait, Duration::from_secs(1));
    assert_eq!(cfg.supervisor.task_store, dir.path().join("tasks.json"));
}
