// src/config/validate.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, RawConfigFile, ShutdownSection, SupervisorSection, SupervisorSettings,
    WorkerConfig, WorkerDefinition,
};
use crate::errors::{Result, WardenError};
use crate::process::ShutdownTimings;
use crate::types::{GLOBAL_SCOPE, WorkerId, parse_duration};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::WardenError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let supervisor = resolve_supervisor(&raw.supervisor)?;
        let shutdown = resolve_shutdown(&raw.shutdown)?;
        let workers = resolve_workers(&raw.worker, &supervisor)?;

        Ok(ConfigFile {
            supervisor,
            shutdown,
            workers,
        })
    }
}

/// Validate without keeping the result.
pub fn validate_config(raw: &RawConfigFile) -> Result<()> {
    ConfigFile::try_from(raw.clone()).map(|_| ())
}

fn resolve_supervisor(section: &SupervisorSection) -> Result<SupervisorSettings> {
    let data_dir = section
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("data"));
    let mut settings = SupervisorSettings::under(data_dir);

    if let Some(dir) = &section.backup_dir {
        settings.backup_dir = dir.clone();
    }
    if let Some(dir) = &section.log_dir {
        settings.log_dir = dir.clone();
    }
    if let Some(path) = &section.task_store {
        settings.task_store = path.clone();
    }

    if let Some(lines) = section.output_buffer_lines {
        if lines == 0 {
            return Err(WardenError::ConfigError(
                "[supervisor].output_buffer_lines must be >= 1 (got 0)".to_string(),
            ));
        }
        settings.output_buffer_lines = lines;
    }

    if let Some(delay) = &section.restart_delay {
        settings.restart_delay = duration_field("supervisor", "restart_delay", delay)?;
    }
    if let Some(every) = &section.task_resync {
        settings.task_resync = duration_field("supervisor", "task_resync", every)?;
        if settings.task_resync.is_zero() {
            return Err(WardenError::ConfigError(
                "[supervisor].task_resync must be positive".to_string(),
            ));
        }
    }

    Ok(settings)
}

fn resolve_shutdown(section: &ShutdownSection) -> Result<ShutdownTimings> {
    let mut timings = ShutdownTimings::default();

    let overrides: [(&str, &Option<String>, &mut Duration); 7] = [
        (
            "interactive_timeout",
            &section.interactive_timeout,
            &mut timings.interactive_wait,
        ),
        ("line_timeout", &section.line_timeout, &mut timings.line_wait),
        ("bare_timeout", &section.bare_timeout, &mut timings.bare_wait),
        ("save_delay", &section.save_delay, &mut timings.save_delay),
        (
            "poll_interval",
            &section.poll_interval,
            &mut timings.poll_interval,
        ),
        ("kill_verify", &section.kill_verify, &mut timings.kill_verify),
        (
            "write_timeout",
            &section.write_timeout,
            &mut timings.write_timeout,
        ),
    ];
    for (key, value, slot) in overrides {
        if let Some(text) = value {
            *slot = duration_field("shutdown", key, text)?;
        }
    }

    if let Some(polls) = section.liveness_polls {
        if polls == 0 {
            return Err(WardenError::ConfigError(
                "[shutdown].liveness_polls must be >= 1 (got 0)".to_string(),
            ));
        }
        timings.liveness_polls = polls;
    }

    Ok(timings)
}

fn resolve_workers(
    raw: &BTreeMap<String, WorkerConfig>,
    supervisor: &SupervisorSettings,
) -> Result<BTreeMap<WorkerId, WorkerDefinition>> {
    let mut workers = BTreeMap::new();

    for (key, cfg) in raw {
        let id: WorkerId = key.trim().parse().map_err(|_| {
            WardenError::ConfigError(format!(
                "worker key '{key}' must be a positive integer (e.g. [worker.1])"
            ))
        })?;
        if id == GLOBAL_SCOPE {
            return Err(WardenError::ConfigError(
                "worker id 0 is reserved for the global scope".to_string(),
            ));
        }
        if workers.contains_key(&id) {
            return Err(WardenError::ConfigError(format!(
                "worker id {id} is declared more than once"
            )));
        }

        if cfg.command.trim().is_empty() {
            return Err(WardenError::ConfigError(format!(
                "[worker.{key}].command must not be empty"
            )));
        }
        if let Some(marker) = &cfg.token_marker {
            if marker.trim().is_empty() {
                return Err(WardenError::ConfigError(format!(
                    "[worker.{key}].token_marker must not be empty when set"
                )));
            }
        }

        let data_dir = cfg.data_dir.clone().unwrap_or_else(|| {
            supervisor
                .data_dir
                .join("workers")
                .join(format!("worker-{id}"))
        });

        workers.insert(
            id,
            WorkerDefinition {
                id,
                name: cfg
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("worker-{id}")),
                kind: cfg.kind,
                command: cfg.command.clone(),
                args: cfg.args.clone(),
                working_dir: cfg.working_dir.clone(),
                env: cfg.env.clone(),
                pty: cfg.pty,
                data_dir,
                token_marker: cfg.token_marker.clone(),
                autostart: cfg.autostart,
            },
        );
    }

    Ok(workers)
}

fn duration_field(section: &str, key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| WardenError::ConfigError(format!("[{section}].{key}: {e}")))
}
