use clap::Parser;
use tracing::Level;
use warden::cli::{CliArgs, Command, LogLevel, TaskCommand};
use warden::logging::resolve_level;

#[test]
fn flag_wins_over_environment() {
    assert_eq!(resolve_level(Some(LogLevel::Debug), Some("error")), Level::DEBUG);
    assert_eq!(resolve_level(Some(LogLevel::Trace), None), Level::TRACE);
}

#[test]
fn environment_is_used_without_a_flag() {
    assert_eq!(resolve_level(None, Some("warn")), Level::WARN);
    assert_eq!(resolve_level(None, Some(" WARNING ")), Level::WARN);
    assert_eq!(resolve_level(None, Some("error")), Level::ERROR);
}

#[test]
fn default_is_info() {
    assert_eq!(resolve_level(None, None), Level::INFO);
    assert_eq!(resolve_level(None, Some("loud")), Level::INFO);
}

#[test]
fn run_command_parses() {
    let args = CliArgs::try_parse_from(["warden", "--config", "/etc/warden.toml", "run", "--no-autostart"])
        .unwrap();
    assert_eq!(args.config, "/etc/warden.toml");
    assert!(matches!(args.command, Command::Run(ref run) if run.no_autostart));
}

#[test]
fn task_add_parses_with_defaults() {
    let args = CliArgs::try_parse_from([
        "warden",
        "task",
        "add",
        "--name",
        "nightly",
        "--type",
        "backup",
        "--cron",
        "0 0 3 * * *",
        "--log-level",
        "debug",
    ])
    .unwrap();

    assert_eq!(args.config, "Warden.toml");
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    match args.command {
        Command::Task(TaskCommand::Add(add)) => {
            assert_eq!(add.name, "nightly");
            assert_eq!(add.task_type, "backup");
            assert_eq!(add.cron, "0 0 3 * * *");
            assert_eq!(add.params, "{}");
            assert!(!add.disabled);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn task_logs_limit_defaults_to_twenty() {
    let args = CliArgs::try_parse_from(["warden", "task", "logs", "4"]).unwrap();
    assert!(matches!(
        args.command,
        Command::Task(TaskCommand::Logs { id: 4, limit: 20 })
    ));
}

#[test]
fn missing_subcommand_is_an_error() {
    assert!(CliArgs::try_parse_from(["warden"]).is_err());
}
