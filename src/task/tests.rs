use crate::error::Error;
use crate::task::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const JOIN_TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

fn counting_task(counter: &Arc<AtomicUsize>) -> TaskHandle {
    let counter = Arc::clone(counter);
    ManagedTask::new(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!("done"))
        },
        Some("counter".to_string()),
        TaskPriority::Normal,
    )
}

#[test]
fn test_task_creation() {
    let task = ManagedTask::new(|| Ok(json!(null)), None, TaskPriority::High);

    assert!(task.name().starts_with("Task-"));
    assert_eq!(task.name().len(), "Task-".len() + 8);
    assert_eq!(task.status(), TaskStatus::Pending);
    assert_eq!(task.priority(), TaskPriority::High);
    assert_eq!(task.runtime(), 0.0);
    assert!(task.start_time().is_none());
    assert!(!task.is_alive());
    assert!(task.group().is_none());
}

#[test]
fn test_task_ids_are_unique() {
    let a = ManagedTask::new(|| Ok(json!(1)), None, TaskPriority::Normal);
    let b = ManagedTask::new(|| Ok(json!(2)), None, TaskPriority::Normal);
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_task_runs_to_completion() {
    let task = ManagedTask::new(|| Ok(json!({"answer": 42})), None, TaskPriority::Normal);

    assert!(task.start());
    assert!(!task.start(), "a task can only be started once");
    task.join(JOIN_TIMEOUT).unwrap();

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.result(), Some(json!({"answer": 42})));
    assert!(task.error().is_none());
    assert!(task.start_time().is_some());
    assert!(task.end_time() >= task.start_time());
    assert!(!task.is_alive());
}

#[test]
fn test_task_failure_is_captured() {
    let task = ManagedTask::new(
        || Err(anyhow::anyhow!("disk on fire")),
        Some("failing".to_string()),
        TaskPriority::Low,
    );

    assert!(task.start());
    task.join(JOIN_TIMEOUT).unwrap();

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error(), Some(TaskError::execution("disk on fire")));
    assert!(task.result().is_none());
    assert!(task.to_record().has_error);
}

#[test]
fn test_task_panic_is_captured() {
    let task = ManagedTask::new(|| panic!("boom"), None, TaskPriority::Normal);

    assert!(task.start());
    task.join(JOIN_TIMEOUT).unwrap();

    assert_eq!(task.status(), TaskStatus::Failed);
    assert!(matches!(
        task.error(),
        Some(TaskError::Panicked { ref message }) if message == "boom"
    ));
}

#[test]
fn test_paused_before_dispatch_never_runs_until_resumed() {
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(&counter);

    assert!(task.start_paused());
    assert_eq!(task.status(), TaskStatus::Waiting);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(task.is_alive());

    assert!(task.resume());
    task.join(JOIN_TIMEOUT).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn test_terminate_paused_task_skips_work() {
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(&counter);

    assert!(task.start_paused());
    assert!(task.terminate());
    task.join(JOIN_TIMEOUT).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(task.status(), TaskStatus::Terminated);
    assert!(task.end_time().is_some());
    assert!(task.result().is_none());
}

#[test]
fn test_pause_in_flight_does_not_interrupt_work() {
    let (started_tx, started_rx) = mpsc::channel();
    let task = ManagedTask::new(
        move || {
            started_tx.send(()).ok();
            thread::sleep(Duration::from_millis(150));
            Ok(json!("slept"))
        },
        None,
        TaskPriority::Normal,
    );

    assert!(task.start());
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(task.pause());
    assert_eq!(task.status(), TaskStatus::Waiting);

    task.join(JOIN_TIMEOUT).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.result(), Some(json!("slept")));
}

#[test]
fn test_terminate_in_flight_keeps_terminated_status() {
    let (started_tx, started_rx) = mpsc::channel();
    let task = ManagedTask::new(
        move || {
            started_tx.send(()).ok();
            thread::sleep(Duration::from_millis(100));
            Ok(json!(7))
        },
        None,
        TaskPriority::Normal,
    );

    assert!(task.start());
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(task.terminate());
    assert_eq!(task.status(), TaskStatus::Terminated);

    task.join(JOIN_TIMEOUT).unwrap();
    assert_eq!(task.status(), TaskStatus::Terminated);
    assert_eq!(task.result(), Some(json!(7)));
}

#[test]
fn test_invalid_transitions_are_rejected() {
    let task = ManagedTask::new(|| Ok(json!(null)), None, TaskPriority::Normal);

    assert!(!task.pause(), "cannot pause a pending task");
    assert!(!task.resume(), "cannot resume a pending task");

    task.start();
    task.join(JOIN_TIMEOUT).unwrap();

    assert!(!task.pause());
    assert!(!task.resume());
    assert!(!task.terminate(), "terminal states are never left");
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn test_terminate_before_start() {
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(&counter);

    assert!(task.terminate());
    assert!(!task.start());
    assert!(task.join(None).is_ok());
    assert_eq!(task.status(), TaskStatus::Terminated);
    assert_eq!(task.runtime(), 0.0);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_join_before_start_is_an_error() {
    let task = ManagedTask::new(|| Ok(json!(null)), Some("idle".to_string()), TaskPriority::Normal);
    assert!(matches!(task.join(None), Err(Error::NotStarted { ref task }) if task == "idle"));
}

#[test]
fn test_join_timeout() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let task = ManagedTask::new(
        move || {
            release_rx.recv().ok();
            Ok(json!(null))
        },
        None,
        TaskPriority::Normal,
    );

    task.start();
    let err = task.join(Some(Duration::from_millis(50))).unwrap_err();
    assert!(err.is_timeout());
    assert!(task.is_alive());

    release_tx.send(()).unwrap();
    task.join(JOIN_TIMEOUT).unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn test_status_counts_tally() {
    let counts = StatusCounts::tally([
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Running,
        TaskStatus::Waiting,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Terminated,
    ]);

    assert_eq!(counts.total, 7);
    assert_eq!(counts.running, 2);
    assert_eq!(counts.waiting, 1);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.terminated, 1);
}

#[test]
fn test_status_serializes_uppercase() {
    assert_eq!(serde_json::to_value(TaskStatus::Waiting).unwrap(), json!("WAITING"));
    assert_eq!(serde_json::to_value(TaskPriority::Critical).unwrap(), json!("CRITICAL"));
    assert!(TaskPriority::Critical > TaskPriority::High);
    assert!(TaskPriority::Low < TaskPriority::Normal);
}

#[test]
fn test_group_membership() {
    let group = TaskGroup::new("workers", "background jobs");
    let task = ManagedTask::new(|| Ok(json!(null)), None, TaskPriority::Normal);

    group.add(&task);
    group.add(&task);
    assert_eq!(group.len(), 1, "adding twice keeps a single entry");
    assert_eq!(task.group_name().as_deref(), Some("workers"));

    assert!(group.remove(&task));
    assert!(group.is_empty());
    assert!(task.group().is_none());
    assert!(!group.remove(&task));
    assert_eq!(task.status(), TaskStatus::Pending, "removal does not terminate");
}

#[test]
fn test_task_belongs_to_at_most_one_group() {
    let first = TaskGroup::new("first", "");
    let second = TaskGroup::new("second", "");
    let task = ManagedTask::new(|| Ok(json!(null)), None, TaskPriority::Normal);

    first.add(&task);
    second.add(&task);

    assert!(!first.contains(&task));
    assert!(second.contains(&task));
    assert_eq!(task.group_name().as_deref(), Some("second"));

    // Removing from a group it no longer belongs to leaves the back-reference alone
    assert!(!first.remove(&task));
    assert_eq!(task.group_name().as_deref(), Some("second"));
}

#[test]
fn test_group_terminate_all_and_stats() {
    let group = TaskGroup::new("batch", "");
    let done = ManagedTask::new(|| Ok(json!(1)), None, TaskPriority::Normal);
    let pending = ManagedTask::new(|| Ok(json!(2)), None, TaskPriority::Normal);
    let paused = ManagedTask::new(|| Ok(json!(3)), None, TaskPriority::Normal);
    for task in [&done, &pending, &paused] {
        group.add(task);
    }

    done.start();
    done.join(JOIN_TIMEOUT).unwrap();
    paused.start_paused();

    let stats = group.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.waiting, 1);

    assert_eq!(group.terminate_all(), 2);
    let stats = group.stats();
    assert_eq!(stats.terminated, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(group.len(), 3, "terminate_all keeps members");

    let names: Vec<_> = group.tasks().iter().map(|t| t.id()).collect();
    assert_eq!(names, vec![done.id(), pending.id(), paused.id()]);
}

#[test]
fn test_task_record() {
    let group = TaskGroup::new("reports", "");
    let task = ManagedTask::new(|| Ok(json!(null)), Some("report".to_string()), TaskPriority::Critical);
    group.add(&task);

    let record = task.to_record();
    assert_eq!(record.id, task.id());
    assert_eq!(record.name, "report");
    assert_eq!(record.status, TaskStatus::Pending);
    assert_eq!(record.priority, TaskPriority::Critical);
    assert_eq!(record.group_name.as_deref(), Some("reports"));
    assert!(record.start_time.is_none());
    assert!(!record.has_error);
}
