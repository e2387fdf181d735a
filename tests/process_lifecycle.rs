use std::sync::Arc;
use std::time::{Duration, Instant};

use warden::errors::WardenError;
use warden::process::{ManagedProcess, ProcessRegistry, SpawnSpec};
use warden::types::WorkerKind;
use warden_test_utils::builders::fast_timings;
use warden_test_utils::recording::SharedLog;
use warden_test_utils::{init_tracing, wait_until, with_timeout, with_timeout_secs};

fn shell(worker: u32, script: &str) -> SpawnSpec {
    SpawnSpec::new(worker, "/bin/sh")
        .args(["-c", script])
        .timings(fast_timings())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bare_worker_stops_on_sigterm() {
    init_tracing();
    let process = ManagedProcess::spawn(shell(1, "sleep 30")).expect("spawn");
    assert!(process.is_running());
    assert!(process.pid() > 0);

    with_timeout(process.stop()).await.expect("stop");

    assert!(!process.is_running());
    assert!(process.exit_report().is_some());
}

/// A bare worker that ignores SIGTERM is brought down by SIGKILL once the
/// graceful ceiling passes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_ignoring_sigterm_is_killed() {
    init_tracing();
    let process = ManagedProcess::spawn(shell(
        1,
        "trap '' TERM; echo ready; while true; do sleep 1; done",
    ))
    .expect("spawn");

    assert!(wait_until(5, || process.output_snapshot().contains("ready")).await);

    let started = Instant::now();
    with_timeout(process.stop()).await.expect("stop escalates to SIGKILL");

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(!process.is_running());
    let report = process.exit_report().expect("exit observed");
    assert!(!report.success);
    assert_eq!(report.code, None, "killed by a signal, not an exit code");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn line_worker_saves_then_exits() {
    init_tracing();
    let script = r#"while read line; do echo "got $line"; if [ "$line" = exit ]; then exit 0; fi; done"#;
    let process =
        ManagedProcess::spawn(shell(2, script).kind(WorkerKind::Line)).expect("spawn");

    let started = Instant::now();
    with_timeout(process.stop()).await.expect("stop");

    // Exited on its own after `exit`; no SIGKILL ceiling was reached.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(process.exit_report().and_then(|r| r.code), Some(0));

    assert!(wait_until(2, || process.output_snapshot().contains("got exit")).await);
    let output = process.output_snapshot();
    let save_at = output.find("got save").expect("save was sent");
    let exit_at = output.find("got exit").expect("exit was sent");
    assert!(save_at < exit_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interactive_worker_stops_after_hangup() {
    init_tracing();
    let process = ManagedProcess::spawn(shell(3, "cat").kind(WorkerKind::Interactive))
        .expect("spawn");

    with_timeout(process.stop()).await.expect("stop");
    assert!(!process.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_reach_stdin_and_output_is_logged() {
    init_tracing();
    let log = SharedLog::new();
    let process = ManagedProcess::spawn(
        shell(4, r#"while read line; do echo "echo:$line"; done"#).log_sink(log.sink()),
    )
    .expect("spawn");

    process.send_command("hello").await.expect("send");
    process.send_command("world\n").await.expect("send");

    assert!(wait_until(5, || process.output_snapshot().contains("echo:world")).await);
    assert_eq!(process.output_snapshot(), "echo:hello\necho:world\n");
    assert!(log.contents().contains("[STDOUT] echo:hello\n"));

    with_timeout(process.stop()).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stderr_lines_are_tagged() {
    init_tracing();
    let log = SharedLog::new();
    let process =
        ManagedProcess::spawn(shell(5, "echo oops 1>&2; sleep 30").log_sink(log.sink()))
            .expect("spawn");

    assert!(wait_until(5, || log.contents().contains("[STDERR] oops")).await);
    assert!(process.output_snapshot().contains("oops"));

    with_timeout(process.stop()).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_after_stop_is_rejected() {
    init_tracing();
    let process = ManagedProcess::spawn(shell(6, "cat")).expect("spawn");
    with_timeout(process.stop()).await.expect("stop");

    let err = process.send_command("say hi").await.unwrap_err();
    assert!(matches!(err, WardenError::ChannelUnavailable { worker: 6, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn self_exit_is_observed() {
    init_tracing();
    let process = ManagedProcess::spawn(shell(7, "exit 3")).expect("spawn");

    let report = with_timeout(process.wait_exit()).await.expect("exit report");
    assert_eq!(report.code, Some(3));
    assert!(!report.success);
    assert!(!process.is_running());

    // Stopping an already-exited worker is a no-op.
    with_timeout(process.stop()).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_idempotent() {
    init_tracing();
    let process = ManagedProcess::spawn(shell(8, "sleep 30")).expect("spawn");
    with_timeout(process.stop()).await.expect("first stop");
    with_timeout(process.stop()).await.expect("second stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_binary_fails_to_spawn() {
    let err = ManagedProcess::spawn(SpawnSpec::new(9, "/nonexistent/warden-test-binary"))
        .unwrap_err();
    assert!(matches!(err, WardenError::SpawnFailed { worker: 9, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interactive_kind_captures_default_setup_marker() {
    init_tracing();
    let process = ManagedProcess::spawn(
        shell(10, "echo 'Setup code: /setup 48213'; sleep 30").kind(WorkerKind::Interactive),
    )
    .expect("spawn");

    assert!(wait_until(5, || process.admin_token().is_some()).await);
    assert_eq!(process.admin_token().as_deref(), Some("/setup 48213"));

    with_timeout(process.stop()).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pty_worker_output_is_filtered() {
    init_tracing();
    let process = ManagedProcess::spawn(
        shell(11, r"printf '\033[2K\033[1Gready\r\n'; cat")
            .kind(WorkerKind::Interactive)
            .pty(true),
    )
    .expect("spawn pty worker");

    assert!(wait_until(5, || process.output_snapshot().contains("ready")).await);
    let output = process.output_snapshot();
    assert!(!output.contains('\x1b'));
    assert!(!output.contains('\r'));

    with_timeout_secs(10, process.stop()).await.expect("stop");
    assert!(!process.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_rejects_duplicate_start() {
    init_tracing();
    let registry = ProcessRegistry::new();
    let first = registry.start(shell(1, "sleep 30")).expect("start");
    let pid = first.pid();

    let err = registry.start(shell(1, "sleep 30")).unwrap_err();
    assert!(matches!(err, WardenError::AlreadyRunning(1)));
    assert_eq!(registry.get(1).map(|p| p.pid()), Some(pid));
    assert_eq!(registry.running_ids(), vec![1]);

    with_timeout(registry.stop(1)).await.expect("stop");
    assert!(registry.get(1).is_none());
    assert!(!registry.is_running(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_replaces_dead_entries() {
    init_tracing();
    let registry = ProcessRegistry::new();
    let first = registry.start(shell(2, "exit 0")).expect("start");
    with_timeout(first.wait_exit()).await;

    let second = registry.start(shell(2, "sleep 30")).expect("restart after exit");
    assert_ne!(first.pid(), second.pid());
    assert!(registry.is_running(2));

    with_timeout(registry.stop(2)).await.expect("stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_stop_unknown_worker() {
    let registry = ProcessRegistry::new();
    let err = registry.stop(42).await.unwrap_err();
    assert!(matches!(err, WardenError::NotRunning(42)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_stop_all_clears_everything() {
    init_tracing();
    let registry = ProcessRegistry::new();
    registry.start(shell(1, "sleep 30")).expect("start 1");
    registry
        .start(shell(2, "cat").kind(WorkerKind::Line))
        .expect("start 2");
    registry.start(shell(3, "sleep 30")).expect("start 3");
    assert_eq!(registry.ids(), vec![1, 2, 3]);

    let failures = with_timeout_secs(15, registry.stop_all()).await;
    assert!(failures.is_empty());
    assert!(registry.ids().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_starts_spawn_exactly_once() {
    init_tracing();
    let registry = Arc::new(ProcessRegistry::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.start(shell(5, "sleep 30")).is_ok()
        }));
    }

    let mut started = 0;
    for handle in handles {
        if handle.await.expect("join") {
            started += 1;
        }
    }
    assert_eq!(started, 1);

    with_timeout(registry.stop(5)).await.expect("stop");
}

/// While the shutdown protocol is still waiting on a stubborn worker, the
/// process is alive but closed to commands, and the registry refuses a new
/// start instead of spawning a second copy.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_during_stop_is_refused() {
    init_tracing();
    let registry = Arc::new(ProcessRegistry::new());
    let mut timings = fast_timings();
    timings.bare_wait = Duration::from_secs(3);
    let stubborn = "trap '' TERM; echo ready; while true; do sleep 1; done";

    let first = registry
        .start(shell(7, stubborn).timings(timings))
        .expect("start");
    assert!(wait_until(5, || first.output_snapshot().contains("ready")).await);

    let stopping = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.stop(7).await })
    };
    assert!(wait_until(2, || first.is_stopping()).await);

    assert!(first.is_running(), "still alive until the protocol finishes");
    assert!(matches!(
        registry.start(shell(7, "sleep 30")),
        Err(WardenError::StopInProgress(7))
    ));
    assert!(matches!(
        first.send_command("say hi").await,
        Err(WardenError::ChannelUnavailable { worker: 7, .. })
    ));

    with_timeout_secs(10, stopping)
        .await
        .expect("join")
        .expect("stop escalates to SIGKILL");
    assert!(!first.is_running());
    assert!(!first.is_stopping());

    let second = registry.start(shell(7, "sleep 30")).expect("start after stop");
    assert_ne!(first.pid(), second.pid());
    with_timeout(registry.stop(7)).await.expect("stop");
}

/// A worker that never reads stdin fills the pipe; the write gives up after
/// the configured ceiling instead of hanging the caller.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_stdin_write_times_out() {
    init_tracing();
    let process =
        ManagedProcess::spawn(shell(12, "sleep 30").kind(WorkerKind::Line)).expect("spawn");

    let flood = "x".repeat(256 * 1024);
    let started = Instant::now();
    let err = with_timeout(process.send_command(&flood)).await.unwrap_err();
    assert!(matches!(err, WardenError::ChannelUnavailable { worker: 12, .. }));
    assert!(started.elapsed() < Duration::from_secs(3));

    // The stuck write released the channel, so stop still runs its protocol.
    with_timeout(process.stop()).await.expect("stop");
    assert!(!process.is_running());
}
