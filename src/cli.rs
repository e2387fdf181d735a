// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::tasks::TaskId;

/// Command-line arguments for `warden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "warden",
    version,
    about = "Supervise game-server workers and run scheduled maintenance tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Warden.toml` in the current working directory. A missing
    /// file means "no workers, data under ./data".
    #[arg(long, global = true, value_name = "PATH", default_value = "Warden.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WARDEN_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the supervisor until Ctrl-C: scheduler plus autostart workers.
    Run(RunArgs),

    /// Validate the config and print workers and stored tasks.
    Check,

    /// Manage scheduled tasks in the task store.
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Do not start workers marked `autostart`.
    #[arg(long)]
    pub no_autostart: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum TaskCommand {
    /// List every stored task.
    List,

    /// Create a task.
    Add(TaskAddArgs),

    /// Delete a task and its execution logs.
    Remove { id: TaskId },

    /// Enable a task.
    Enable { id: TaskId },

    /// Disable a task.
    Disable { id: TaskId },

    /// Show execution logs, newest first.
    Logs {
        id: TaskId,

        /// Maximum rows to show (0 = all).
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Execute a task once in this process and print the log row.
    Run { id: TaskId },
}

#[derive(Debug, Clone, Args)]
pub struct TaskAddArgs {
    #[arg(long)]
    pub name: String,

    /// backup | restart | cleanup_backup | cleanup_log | broadcast | custom_command
    #[arg(long = "type", value_name = "TYPE")]
    pub task_type: String,

    /// Cron expression (5 or 6 fields, @daily, @every 10m, ...).
    #[arg(long, value_name = "EXPR")]
    pub cron: String,

    /// Parameters as a JSON object, e.g. '{"workerId": 1}'.
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub params: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Store the task disabled.
    #[arg(long)]
    pub disabled: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
