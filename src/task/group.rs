use crate::task::managed::TaskHandle;
use crate::task::types::StatusCounts;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared handle to a task group
pub type GroupHandle = Arc<TaskGroup>;

/// Named collection of tasks with aggregate status counts.
///
/// The group does not own the lifetime of its members: removing a task does
/// not terminate it.
pub struct TaskGroup {
    id: Uuid,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    members: Mutex<Vec<TaskHandle>>,
}

impl TaskGroup {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> GroupHandle {
        let group = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
            members: Mutex::new(Vec::new()),
        };
        debug!(group = %group.name, "Task group created");
        Arc::new(group)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Add a task, moving it out of any group it previously belonged to
    pub fn add(self: &Arc<Self>, task: &TaskHandle) {
        // Lock order: task's group slot, then member lists.
        let mut slot = task.group.lock();
        if let Some(previous) = slot.as_ref().and_then(|w| w.upgrade()) {
            if Arc::ptr_eq(&previous, self) {
                return;
            }
            previous.members.lock().retain(|t| !Arc::ptr_eq(t, task));
            debug!(group = %previous.name, task_id = %task.id(), "Task moved out of group");
        }
        self.members.lock().push(Arc::clone(task));
        *slot = Some(Arc::downgrade(self));
    }

    /// Remove a task from this group; returns whether it was a member
    pub fn remove(&self, task: &TaskHandle) -> bool {
        let removed = {
            let mut members = self.members.lock();
            let before = members.len();
            members.retain(|t| !Arc::ptr_eq(t, task));
            members.len() != before
        };

        let mut slot = task.group.lock();
        if slot
            .as_ref()
            .is_some_and(|w| std::ptr::eq(w.as_ptr(), self))
        {
            *slot = None;
        }
        removed
    }

    /// Terminate every member; members stay in the group
    pub fn terminate_all(&self) -> usize {
        let members = self.tasks();
        let terminated = members.iter().filter(|t| t.terminate()).count();
        info!(group = %self.name, terminated, "Group termination requested");
        terminated
    }

    pub fn stats(&self) -> StatusCounts {
        StatusCounts::tally(self.members.lock().iter().map(|t| t.status()))
    }

    /// Snapshot of the members in insertion order
    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.members.lock().clone()
    }

    pub fn contains(&self, task: &TaskHandle) -> bool {
        self.members.lock().iter().any(|t| Arc::ptr_eq(t, task))
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }
}

impl fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGroup")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.len())
            .finish()
    }
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskGroup({}, tasks={})", self.name, self.len())
    }
}
