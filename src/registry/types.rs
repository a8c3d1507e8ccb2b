use crate::monitor::ResourceSample;
use crate::pool::PoolStats;
use crate::task::{StatusCounts, TaskId, TaskPriority, TaskRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options for a task created through the registry
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    pub name: Option<String>,
    pub priority: TaskPriority,
    /// Group to join; created on demand
    pub group: Option<String>,
    /// Start the task immediately after registration
    pub auto_start: bool,
}

impl TaskSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn auto_start(mut self) -> Self {
        self.auto_start = true;
        self
    }
}

/// Registry-wide task counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatsSnapshot {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub groups: usize,
    pub pools: usize,
}

/// Current utilization plus the retained history series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_usage: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f64,
    pub cpu_history: Vec<ResourceSample>,
    pub memory_history: Vec<ResourceSample>,
}

/// Document written by [`crate::registry::Registry::save_session_log`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub timestamp: DateTime<Utc>,
    /// Seconds since the oldest retained resource sample, 0 without samples
    pub duration: f64,
    pub stats: TaskStatsSnapshot,
    pub system: SystemStats,
    pub pools: Vec<PoolStats>,
    pub tasks: BTreeMap<TaskId, TaskRecord>,
}
