use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// Value produced by a successful work function
pub type TaskOutput = serde_json::Value;

/// Task priority levels.
///
/// Advisory metadata only: pools dequeue in submission order regardless of priority.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Normal => "NORMAL",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a managed task.
///
/// ```text
/// Pending ──start──▶ Running ──▶ Completed | Failed
///                     ▲   │
///               resume│   │pause
///                     │   ▼
///                    Waiting
/// (any non-terminal) ──terminate──▶ Terminated
/// ```
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created but not started
    #[default]
    Pending,
    /// Execution unit started
    Running,
    /// Paused; the work function is held back until resumed
    Waiting,
    /// Work function returned a value
    Completed,
    /// Work function returned an error or panicked
    Failed,
    /// Cooperative exit was requested
    Terminated,
}

impl TaskStatus {
    /// Terminal states are never left once entered
    pub fn is_terminal(&self) -> bool {
        match self {
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Terminated => true,
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Waiting => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Waiting => "WAITING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure captured from a task's work function
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The work function returned an error
    #[error("{message}")]
    Execution { message: String },

    /// The work function panicked
    #[error("panicked: {message}")]
    Panicked { message: String },

    /// The task was terminated before its work was dispatched
    #[error("terminated before dispatch")]
    Terminated,
}

impl TaskError {
    pub fn execution(message: impl Into<String>) -> Self {
        TaskError::Execution {
            message: message.into(),
        }
    }

    pub(crate) fn from_anyhow(error: &anyhow::Error) -> Self {
        TaskError::Execution {
            message: format!("{:#}", error),
        }
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        TaskError::Panicked {
            message: panic_message(payload),
        }
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Point-in-time tally of tasks by status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub running: usize,
    pub waiting: usize,
    pub completed: usize,
    pub failed: usize,
    pub terminated: usize,
}

impl StatusCounts {
    /// Count statuses; pending tasks only contribute to `total`
    pub fn tally<I: IntoIterator<Item = TaskStatus>>(statuses: I) -> Self {
        let mut counts = StatusCounts::default();
        for status in statuses {
            counts.total += 1;
            match status {
                TaskStatus::Pending => {}
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Waiting => counts.waiting += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Terminated => counts.terminated += 1,
            }
        }
        counts
    }
}

/// Serializable projection of a task, as written to session logs
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub runtime_seconds: f64,
    pub group_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub has_error: bool,
}
