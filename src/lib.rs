// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod process;
pub mod schedule;
pub mod supervisor;
pub mod tasks;
pub mod types;
pub mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command, RunArgs, TaskAddArgs, TaskCommand};
use crate::config::ConfigFile;
use crate::config::loader::load_or_default;
use crate::supervisor::Supervisor;
use crate::tasks::{JsonTaskStore, ScheduledTask, TaskStore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the JSON task store
/// - the supervisor (workers, executor, scheduler)
/// - Ctrl-C handling for `warden run`
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)
        .with_context(|| format!("loading config from {}", args.config))?;

    match args.command {
        Command::Run(opts) => run_daemon(&cfg, opts).await,
        Command::Check => print_check(&cfg),
        Command::Task(cmd) => run_task_command(&cfg, cmd).await,
    }
}

fn open_store(cfg: &ConfigFile) -> Result<Arc<dyn TaskStore>> {
    let store = JsonTaskStore::open(&cfg.supervisor.task_store).with_context(|| {
        format!(
            "opening task store {}",
            cfg.supervisor.task_store.display()
        )
    })?;
    Ok(Arc::new(store))
}

async fn run_daemon(cfg: &ConfigFile, opts: RunArgs) -> Result<()> {
    let supervisor = Supervisor::new(cfg, open_store(cfg)?);

    if !opts.no_autostart {
        let failures = supervisor.autostart();
        if !failures.is_empty() {
            warn!(failed = failures.len(), "some workers did not autostart");
        }
    }

    let scheduled = supervisor.start()?;
    info!(
        workers = supervisor.catalog().len(),
        scheduled, "warden running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("shutdown requested");
    supervisor.shutdown().await;
    Ok(())
}

/// Print the resolved configuration and the stored tasks.
fn print_check(cfg: &ConfigFile) -> Result<()> {
    let s = &cfg.supervisor;
    println!("warden check");
    println!("  supervisor.data_dir = {}", s.data_dir.display());
    println!("  supervisor.backup_dir = {}", s.backup_dir.display());
    println!("  supervisor.log_dir = {}", s.log_dir.display());
    println!("  supervisor.task_store = {}", s.task_store.display());
    println!("  supervisor.output_buffer_lines = {}", s.output_buffer_lines);
    println!("  supervisor.restart_delay = {:?}", s.restart_delay);
    println!();

    println!("workers ({}):", cfg.workers.len());
    for (id, w) in cfg.workers.iter() {
        println!("  - [{id}] {} ({})", w.name, w.kind);
        println!("      command: {} {}", w.command, w.args.join(" "));
        println!("      data_dir: {}", w.data_dir.display());
        if w.pty {
            println!("      pty: true");
        }
        if let Some(ref marker) = w.token_marker {
            println!("      token_marker: {marker}");
        }
        if w.autostart {
            println!("      autostart: true");
        }
    }
    println!();

    let store = open_store(cfg)?;
    let tasks = store.get_all()?;
    println!("tasks ({}):", tasks.len());
    for task in &tasks {
        print_task_line(task);
        if let Err(e) = supervisor::validate_task(task) {
            println!("      INVALID: {e}");
        }
    }

    Ok(())
}

async fn run_task_command(cfg: &ConfigFile, cmd: TaskCommand) -> Result<()> {
    let supervisor = Supervisor::new(cfg, open_store(cfg)?);

    match cmd {
        TaskCommand::List => {
            for task in supervisor.list_tasks()? {
                print_task_line(&task);
            }
        }
        TaskCommand::Add(add) => {
            let task = supervisor.create_task(task_from_args(add)?)?;
            println!("created task {}", task.id);
        }
        TaskCommand::Remove { id } => {
            supervisor.delete_task(id)?;
            println!("removed task {id}");
        }
        TaskCommand::Enable { id } => {
            supervisor.set_task_enabled(id, true)?;
            println!("enabled task {id}");
        }
        TaskCommand::Disable { id } => {
            supervisor.set_task_enabled(id, false)?;
            println!("disabled task {id}");
        }
        TaskCommand::Logs { id, limit } => {
            for log in supervisor.task_logs(id, limit)? {
                let detail = log
                    .error_message
                    .as_deref()
                    .or(log.output.as_deref())
                    .unwrap_or("");
                println!(
                    "#{} {} {} {}ms {}",
                    log.id,
                    log.started_at.to_rfc3339(),
                    log.status,
                    log.duration_ms,
                    detail
                );
            }
        }
        TaskCommand::Run { id } => match supervisor.scheduler().execute_task(id).await? {
            Some(log) => println!("{}", serde_json::to_string_pretty(&log)?),
            None => println!("task {id} is already executing"),
        },
    }

    Ok(())
}

fn task_from_args(args: TaskAddArgs) -> Result<ScheduledTask> {
    let params: serde_json::Value = serde_json::from_str(&args.params)
        .with_context(|| format!("--params is not valid JSON: {}", args.params))?;

    let mut task = ScheduledTask::new(args.name, args.task_type, args.cron, params);
    task.description = args.description;
    task.enabled = !args.disabled;
    Ok(task)
}

fn print_task_line(task: &ScheduledTask) {
    let status = task
        .last_run_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  - [{}] {} type={} cron='{}' enabled={} runs={} ok={} failed={} last={}",
        task.id,
        task.name,
        task.task_type,
        task.cron_expression,
        task.enabled,
        task.run_count,
        task.success_count,
        task.failed_count,
        status
    );
}
