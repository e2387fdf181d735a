use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::{TempDir, tempdir};
use warden::config::ConfigFile;
use warden::errors::WardenError;
use warden::supervisor::{Supervisor, validate_task};
use warden::tasks::{JsonTaskStore, MemoryTaskStore, TaskStore};
use warden::types::{RunStatus, TaskType, WorkerKind};
use warden_test_utils::builders::{ConfigFileBuilder, TaskBuilder, WorkerConfigBuilder};
use warden_test_utils::recording::{Call, RecordingHandlers};
use warden_test_utils::{init_tracing, wait_until, with_timeout, with_timeout_secs};

const ECHO: &str = r#"echo "Setup code: /setup 31337"; while read line; do echo "echo:$line"; done"#;

fn config(dir: &TempDir) -> ConfigFile {
    ConfigFileBuilder::new()
        .data_dir(dir.path())
        .fast_shutdown()
        .restart_delay("100ms")
        .with_worker(
            1,
            WorkerConfigBuilder::shell(ECHO)
                .name("survival")
                .kind(WorkerKind::Interactive)
                .autostart()
                .build(),
        )
        .with_worker(
            2,
            WorkerConfigBuilder::shell(r#"while read line; do echo "got $line"; [ "$line" = exit ] && exit 0; done"#)
                .kind(WorkerKind::Line)
                .build(),
        )
        .build()
}

fn supervisor(dir: &TempDir) -> Supervisor {
    init_tracing();
    Supervisor::new(&config(dir), Arc::new(MemoryTaskStore::new()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_lifecycle_through_the_facade() {
    let dir = tempdir().unwrap();
    let sup = supervisor(&dir);

    let pid = sup.start_worker(1).unwrap();
    assert!(matches!(sup.start_worker(1), Err(WardenError::AlreadyRunning(1))));

    let status = sup.worker_status(1).unwrap();
    assert!(status.running);
    assert_eq!(status.pid, Some(pid));
    assert_eq!(status.name, "survival");

    sup.send_command(1, "list").await.unwrap();
    assert!(wait_until(5, || sup.worker_output(1).unwrap().contains("echo:list")).await);
    assert!(wait_until(5, || sup.admin_token(1).is_some()).await);
    assert_eq!(sup.admin_token(1).as_deref(), Some("/setup 31337"));

    // Output also lands in the worker's append-only log file.
    let log_file = dir.path().join("workers/worker-1/logs/server.log");
    assert!(wait_until(5, || {
        fs::read_to_string(&log_file).is_ok_and(|s| s.contains("[STDOUT] echo:list"))
    })
    .await);

    with_timeout(sup.stop_worker(1)).await.unwrap();
    assert!(!sup.worker_status(1).unwrap().running);
    assert!(matches!(
        sup.send_command(1, "list").await,
        Err(WardenError::NotRunning(1))
    ));
    assert!(matches!(
        sup.stop_worker(1).await,
        Err(WardenError::NotRunning(1))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_replaces_the_process() {
    let dir = tempdir().unwrap();
    let sup = supervisor(&dir);

    let first = sup.start_worker(2).unwrap();
    let second = with_timeout(sup.restart_worker(2)).await.unwrap();
    assert_ne!(first, second);
    assert!(sup.worker_status(2).unwrap().running);

    // Restarting a stopped worker just starts it.
    with_timeout(sup.stop_worker(2)).await.unwrap();
    let third = with_timeout(sup.restart_worker(2)).await.unwrap();
    assert!(sup.worker_status(2).unwrap().running);
    assert_ne!(second, third);

    with_timeout(sup.shutdown()).await;
    assert!(sup.registry().running_ids().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_workers_are_reported() {
    let dir = tempdir().unwrap();
    let sup = supervisor(&dir);

    assert!(matches!(sup.start_worker(7), Err(WardenError::WorkerNotFound(7))));
    assert!(matches!(sup.worker_status(7), Err(WardenError::WorkerNotFound(7))));
    assert!(matches!(sup.worker_output(7), Err(WardenError::NotRunning(7))));

    let ids: Vec<u32> = sup.worker_statuses().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn autostart_and_shutdown() {
    let dir = tempdir().unwrap();
    let sup = supervisor(&dir);

    assert!(sup.autostart().is_empty());
    assert_eq!(sup.registry().running_ids(), vec![1]);

    with_timeout_secs(10, sup.shutdown()).await;
    assert!(sup.registry().ids().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcast_task_reaches_the_console() {
    let dir = tempdir().unwrap();
    let sup = supervisor(&dir);
    sup.start_worker(1).unwrap();

    let task = sup
        .create_task(
            TaskBuilder::new(TaskType::Broadcast)
                .params(json!({"workerId": 1, "message": "restart in 5"}))
                .build(),
        )
        .unwrap();

    let log = sup.scheduler().execute_task(task.id).await.unwrap().unwrap();
    assert_eq!(log.status, RunStatus::Success, "{log:?}");
    assert!(wait_until(5, || {
        sup.worker_output(1)
            .unwrap()
            .contains("echo:broadcast restart in 5")
    })
    .await);

    with_timeout(sup.shutdown()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_crud_keeps_timers_in_sync() {
    let dir = tempdir().unwrap();
    let sup = supervisor(&dir);

    let created = sup
        .create_task(TaskBuilder::new(TaskType::Backup).cron("0 0 3 * * *").build())
        .unwrap();
    assert!(sup.scheduler().is_scheduled(created.id));
    assert!(created.next_run_at.is_some(), "create returns the stored row");

    let mut edited = created.clone();
    edited.cron_expression = "0 30 4 * * *".to_string();
    edited.run_count = 50; // bookkeeping is not editable
    let updated = sup.update_task(&edited).unwrap();
    assert_eq!(updated.cron_expression, "0 30 4 * * *");
    assert_eq!(updated.run_count, 0);

    let disabled = sup.set_task_enabled(created.id, false).unwrap();
    assert!(!disabled.enabled);
    assert_eq!(disabled.next_run_at, None);
    assert!(!sup.scheduler().is_scheduled(created.id));

    sup.set_task_enabled(created.id, true).unwrap();
    assert!(sup.scheduler().is_scheduled(created.id));

    sup.delete_task(created.id).unwrap();
    assert!(!sup.scheduler().is_scheduled(created.id));
    assert!(matches!(
        sup.get_task(created.id),
        Err(WardenError::TaskNotFound(_))
    ));
    assert!(matches!(
        sup.task_logs(created.id, 10),
        Err(WardenError::TaskNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_tasks_are_not_stored() {
    let dir = tempdir().unwrap();
    let sup = supervisor(&dir);

    let bad_cron = TaskBuilder::new(TaskType::Backup).cron("every day").build();
    assert!(matches!(
        sup.create_task(bad_cron),
        Err(WardenError::InvalidSchedule(_))
    ));

    let bad_type = TaskBuilder::raw_type("vacuum").build();
    assert!(matches!(
        sup.create_task(bad_type),
        Err(WardenError::UnknownTaskType(_))
    ));

    let bad_params = TaskBuilder::new(TaskType::Restart).build();
    assert!(matches!(
        sup.create_task(bad_params),
        Err(WardenError::InvalidParams(_))
    ));

    let no_name = TaskBuilder::new(TaskType::Backup).name(" ").build();
    assert!(validate_task(&no_name).is_err());

    assert!(sup.list_tasks().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_now_with_custom_handlers_and_json_store() {
    init_tracing();
    let dir = tempdir().unwrap();
    let store: Arc<dyn TaskStore> =
        Arc::new(JsonTaskStore::open(dir.path().join("tasks.json")).unwrap());
    let recorder = RecordingHandlers::new();
    let sup = Supervisor::with_handlers(&config(&dir), store, recorder.handlers());

    let task = sup
        .create_task(
            TaskBuilder::new(TaskType::CleanupBackup)
                .params(json!({"workerId": 1, "daysToKeep": 3}))
                .build(),
        )
        .unwrap();

    sup.run_task_now(task.id).unwrap();
    assert!(wait_until(3, || sup.get_task(task.id).unwrap().run_count == 1).await);
    assert!(wait_until(3, || {
        sup.task_logs(task.id, 0)
            .unwrap()
            .first()
            .is_some_and(|l| l.status == RunStatus::Success)
    })
    .await);
    assert_eq!(
        recorder.calls(),
        vec![Call::CleanupBackup { worker: 1, days: 3 }]
    );

    // The row is on disk, not just in memory.
    let reopened = JsonTaskStore::open(dir.path().join("tasks.json")).unwrap();
    assert_eq!(reopened.get_by_id(task.id).unwrap().success_count, 1);
}
