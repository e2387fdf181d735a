use std::fs;

use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::tempdir;
use warden::errors::WardenError;
use warden::tasks::{JsonTaskStore, LOGS_PER_TASK, MemoryTaskStore, TaskExecutionLog, TaskStore};
use warden::types::{RunStatus, TaskType};
use warden_test_utils::builders::TaskBuilder;

/// Behaviour every store must share.
fn exercise_store(store: &dyn TaskStore) {
    let mut seeded = TaskBuilder::new(TaskType::Backup).name("nightly").id(99).build();
    seeded.run_count = 12;
    seeded.success_count = 12;
    let first = store.create(seeded).unwrap();
    assert_eq!(first.id, 1, "incoming id is ignored");
    assert_eq!(first.run_count, 0, "counters start at zero");
    assert_eq!(first.success_count, 0);

    let second = store
        .create(TaskBuilder::new(TaskType::Restart).name("reboot").disabled().build())
        .unwrap();
    assert_eq!(second.id, 2);

    assert_eq!(store.get_all().unwrap().len(), 2);
    let enabled: Vec<u64> = store.get_enabled().unwrap().iter().map(|t| t.id).collect();
    assert_eq!(enabled, vec![1]);

    let mut edited = store.get_by_id(1).unwrap();
    edited.description = "copy worlds".to_string();
    let updated = store.update(&edited).unwrap();
    assert_eq!(updated.created_at, first.created_at);
    assert!(updated.updated_at >= first.updated_at);
    assert_eq!(store.get_by_id(1).unwrap().description, "copy worlds");

    assert!(matches!(
        store.get_by_id(404),
        Err(WardenError::TaskNotFound(404))
    ));
    let mut ghost = edited.clone();
    ghost.id = 404;
    assert!(matches!(store.update(&ghost), Err(WardenError::TaskNotFound(404))));

    // Logs: newest first, limit respected.
    let base = Utc::now() - Duration::minutes(10);
    for minute in 0..3 {
        let log = TaskExecutionLog::started(1, base + Duration::minutes(minute));
        store.create_log(log).unwrap();
    }
    store
        .create_log(TaskExecutionLog::started(2, base))
        .unwrap();

    let logs = store.get_logs(1, 0).unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.windows(2).all(|w| w[0].started_at >= w[1].started_at));
    assert_eq!(store.get_logs(1, 2).unwrap().len(), 2);

    // Finalize one log in place.
    let mut newest = logs[0].clone();
    newest.finish(newest.started_at + Duration::milliseconds(250), &Ok("done".to_string()));
    store.update_log(&newest).unwrap();
    let reread = store.get_logs(1, 1).unwrap().remove(0);
    assert_eq!(reread.id, newest.id);
    assert_eq!(reread.status, RunStatus::Success);
    assert_eq!(reread.duration_ms, 250);
    assert_eq!(reread.output.as_deref(), Some("done"));

    // Deleting a task cascades to its logs only.
    store.delete(1).unwrap();
    assert!(store.get_logs(1, 0).unwrap().is_empty());
    assert_eq!(store.get_logs(2, 0).unwrap().len(), 1);
    assert!(matches!(store.delete(1), Err(WardenError::TaskNotFound(1))));

    assert_eq!(store.delete_logs(2).unwrap(), 1);
    assert_eq!(store.delete_logs(2).unwrap(), 0);

    // Ids are never reused.
    let third = store
        .create(TaskBuilder::new(TaskType::CleanupLog).build())
        .unwrap();
    assert_eq!(third.id, 3);
}

#[test]
fn memory_store_contract() {
    exercise_store(&MemoryTaskStore::new());
}

#[test]
fn json_store_contract() {
    let tmp = tempdir().unwrap();
    let store = JsonTaskStore::open(tmp.path().join("tasks.json")).unwrap();
    exercise_store(&store);
}

#[test]
fn json_store_survives_reopen() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("state").join("tasks.json");

    {
        let store = JsonTaskStore::open(&path).unwrap();
        let task = store
            .create(
                TaskBuilder::new(TaskType::Broadcast)
                    .name("announce")
                    .cron("0 55 2 * * *")
                    .params(json!({"workerId": 1, "message": "restart soon"}))
                    .build(),
            )
            .unwrap();
        let mut log = store
            .create_log(TaskExecutionLog::started(task.id, Utc::now()))
            .unwrap();
        log.finish(Utc::now(), &Err("worker 1 is not running".to_string()));
        store.update_log(&log).unwrap();
    }

    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let store = JsonTaskStore::open(&path).unwrap();
    let task = store.get_by_id(1).unwrap();
    assert_eq!(task.name, "announce");
    assert_eq!(task.cron_expression, "0 55 2 * * *");
    assert_eq!(task.params["message"], "restart soon");

    let logs = store.get_logs(1, 0).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Failed);
    assert_eq!(logs[0].error_message.as_deref(), Some("worker 1 is not running"));

    let next = store
        .create(TaskBuilder::new(TaskType::Backup).build())
        .unwrap();
    assert_eq!(next.id, 2);
}

#[test]
fn two_handles_on_one_file_see_each_other() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("tasks.json");
    let daemon = JsonTaskStore::open(&path).unwrap();
    let cli = JsonTaskStore::open(&path).unwrap();

    let a = daemon
        .create(TaskBuilder::new(TaskType::Backup).name("a").build())
        .unwrap();
    let b = cli
        .create(TaskBuilder::new(TaskType::Restart).name("b").build())
        .unwrap();
    assert_eq!(b.id, 2, "ids continue across handles");

    // A write through the first handle keeps the row added through the second.
    daemon
        .create_log(TaskExecutionLog::started(a.id, Utc::now()))
        .unwrap();
    let names: Vec<String> = JsonTaskStore::open(&path)
        .unwrap()
        .get_all()
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["a", "b"]);

    // Reads see edits made elsewhere.
    let mut disabled = cli.get_by_id(a.id).unwrap();
    disabled.enabled = false;
    cli.update(&disabled).unwrap();
    assert!(!daemon.get_by_id(a.id).unwrap().enabled);
    assert_eq!(daemon.get_logs(a.id, 0).unwrap().len(), 1);

    cli.delete(b.id).unwrap();
    assert!(matches!(
        daemon.get_by_id(b.id),
        Err(WardenError::TaskNotFound(2))
    ));
}

#[test]
fn concurrent_writers_lose_nothing() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("tasks.json");

    let writers: Vec<_> = (0..4)
        .map(|n| {
            let path = path.clone();
            std::thread::spawn(move || {
                let store = JsonTaskStore::open(&path).unwrap();
                for i in 0..5 {
                    store
                        .create(TaskBuilder::new(TaskType::Backup).name(&format!("w{n}-{i}")).build())
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let store = JsonTaskStore::open(&path).unwrap();
    let mut ids: Vec<u64> = store.get_all().unwrap().iter().map(|t| t.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<u64>>());
}

#[test]
fn old_log_rows_are_dropped_past_the_cap() {
    let store = MemoryTaskStore::new();
    let task = store.create(TaskBuilder::new(TaskType::Backup).build()).unwrap();
    let other = store.create(TaskBuilder::new(TaskType::Restart).build()).unwrap();
    store
        .create_log(TaskExecutionLog::started(other.id, Utc::now() - Duration::days(30)))
        .unwrap();

    let base = Utc::now() - Duration::days(1);
    let extra = 5;
    let mut first_kept = None;
    for n in 0..(LOGS_PER_TASK + extra) {
        let offset = i64::try_from(n).unwrap();
        let log = store
            .create_log(TaskExecutionLog::started(task.id, base + Duration::seconds(offset)))
            .unwrap();
        if n == extra {
            first_kept = Some(log.id);
        }
    }

    let logs = store.get_logs(task.id, 0).unwrap();
    assert_eq!(logs.len(), LOGS_PER_TASK);
    assert_eq!(logs.last().map(|l| l.id), first_kept, "oldest rows go first");
    assert_eq!(store.get_logs(other.id, 0).unwrap().len(), 1, "other tasks keep theirs");
}

#[test]
fn json_store_missing_file_is_empty() {
    let tmp = tempdir().unwrap();
    let store = JsonTaskStore::open(tmp.path().join("absent.json")).unwrap();
    assert!(store.get_all().unwrap().is_empty());
    assert!(!tmp.path().join("absent.json").exists());
}

#[test]
fn json_store_rejects_corrupt_file() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("tasks.json");
    fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        JsonTaskStore::open(&path),
        Err(WardenError::JsonError(_))
    ));
}

#[test]
fn task_rows_serialize_in_camel_case() {
    let task = TaskBuilder::new(TaskType::CleanupBackup)
        .params(json!({"daysToKeep": 14}))
        .build();
    let value = serde_json::to_value(&task).unwrap();

    assert_eq!(value["type"], "cleanup_backup");
    assert_eq!(value["cronExpression"], "0 0 3 * * *");
    assert_eq!(value["runCount"], 0);
    assert!(value.get("task_type").is_none());
}

#[test]
fn finish_run_keeps_counters_consistent() {
    let mut task = TaskBuilder::new(TaskType::Backup).build();
    let now = Utc::now();

    task.begin_run(now);
    assert_eq!(task.last_run_status, Some(RunStatus::Running));
    task.finish_run(None, Some(now + Duration::days(1)));
    task.begin_run(now);
    task.finish_run(Some("disk full"), None);

    assert_eq!(task.run_count, 2);
    assert_eq!(task.success_count + task.failed_count, task.run_count);
    assert_eq!(task.last_run_status, Some(RunStatus::Failed));
    assert_eq!(task.last_run_error.as_deref(), Some("disk full"));
}
