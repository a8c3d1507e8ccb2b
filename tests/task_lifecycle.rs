use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use threadkeeper::{ManagedTask, Registry, RegistryConfig, TaskPriority, TaskSpec, TaskStatus};

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

#[test]
fn test_paused_task_never_begins_until_resumed() {
    let began = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&began);
    let task = ManagedTask::new(
        move || {
            flag.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(json!("slept"))
        },
        Some("sleeper".to_string()),
        TaskPriority::Normal,
    );

    assert!(task.start_paused());
    assert_eq!(task.status(), TaskStatus::Waiting);
    std::thread::sleep(Duration::from_millis(50));
    assert!(!began.load(Ordering::SeqCst), "work must not begin while paused");

    assert!(task.resume());
    task.join(WAIT).expect("Task should finish");
    assert!(began.load(Ordering::SeqCst));
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn test_pause_during_work_does_not_interrupt_it() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let task = ManagedTask::new(
        move || {
            let _ = entered_tx.send(());
            std::thread::sleep(Duration::from_millis(50));
            Ok(json!("slept"))
        },
        None,
        TaskPriority::Normal,
    );

    assert!(task.start());
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("Work should begin");
    assert!(task.pause());
    assert_eq!(task.status(), TaskStatus::Waiting);

    task.join(WAIT).expect("Task should finish");
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.result(), Some(json!("slept")));
}

#[test]
fn test_terminated_group_stops_pending_members() {
    let registry = Registry::with_config(RegistryConfig::default()).expect("Default config is valid");
    let tasks: Vec<_> = (0..4)
        .map(|i| registry.create_task(move || Ok(json!(i)), TaskSpec::default().in_group("idle")))
        .collect();

    let group = registry.get_group("idle").expect("Group should exist");
    assert_eq!(group.terminate_all(), 4);
    for task in &tasks {
        assert_eq!(task.status(), TaskStatus::Terminated);
        assert!(!task.start(), "terminated tasks cannot be started");
    }
    assert_eq!(registry.cleanup_completed(), 4);
    assert!(group.is_empty());
}
