//! Managed tasks: one unit of user-supplied work on its own thread.
//!
//! Cancellation and pausing are cooperative. The resumption gate and the exit
//! signal are only consulted before the work function is invoked; once the
//! single invocation is underway neither `pause` nor `terminate` can
//! interrupt it.

use crate::error::{Error, Result};
use crate::task::group::TaskGroup;
use crate::task::types::*;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Boxed work function run by a managed task
pub type WorkFn = Box<dyn FnOnce() -> anyhow::Result<TaskOutput> + Send + 'static>;

/// Shared handle to a managed task
pub type TaskHandle = Arc<ManagedTask>;

/// A unit of concurrent work with explicit lifecycle state
pub struct ManagedTask {
    id: TaskId,
    name: String,
    priority: TaskPriority,
    work: Mutex<Option<WorkFn>>,
    state: Mutex<TaskState>,
    /// Signalled when the resumption gate opens or exit is requested
    gate: Condvar,
    /// Signalled when the execution unit concludes
    concluded: Condvar,
    pub(super) group: Mutex<Option<Weak<TaskGroup>>>,
}

#[derive(Debug, Default)]
struct TaskState {
    status: TaskStatus,
    spawned: bool,
    finished: bool,
    gate_open: bool,
    exit_requested: bool,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    result: Option<TaskOutput>,
    error: Option<TaskError>,
}

impl ManagedTask {
    /// Create a task that has not been started yet
    pub fn new<F>(work: F, name: Option<String>, priority: TaskPriority) -> TaskHandle
    where
        F: FnOnce() -> anyhow::Result<TaskOutput> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let name = name.unwrap_or_else(|| format!("Task-{}", &id.simple().to_string()[..8]));
        debug!(task_id = %id, task = %name, "Task created");

        Arc::new(Self {
            id,
            name,
            priority,
            work: Mutex::new(Some(Box::new(work))),
            state: Mutex::new(TaskState {
                gate_open: true,
                ..TaskState::default()
            }),
            gate: Condvar::new(),
            concluded: Condvar::new(),
            group: Mutex::new(None),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// Start execution on a dedicated thread.
    ///
    /// Returns `false` if the task has already been started or terminated,
    /// or if its thread could not be spawned (the task then stays `Pending`).
    pub fn start(self: &Arc<Self>) -> bool {
        self.launch(false)
    }

    /// Start the execution unit with the resumption gate already closed.
    ///
    /// Equivalent to `start()` immediately followed by `pause()`, without a
    /// window in which the work function could be dispatched. The task sits
    /// in `Waiting` until `resume()` or `terminate()`.
    pub fn start_paused(self: &Arc<Self>) -> bool {
        self.launch(true)
    }

    fn launch(self: &Arc<Self>, paused: bool) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Pending {
            return false;
        }

        // The new thread blocks on `state` until this guard is released, so
        // every field below is visible before any execution happens.
        Self::mark_launched(&mut state, paused);

        let task = Arc::clone(self);
        match thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || task.run())
        {
            Ok(_) => {
                info!(task_id = %self.id, task = %self.name, paused, "Task started");
                true
            }
            Err(e) => {
                // Nothing ran, so the task stays PENDING and may be started again.
                error!(task_id = %self.id, task = %self.name, "Failed to spawn task thread: {}", e);
                Self::undo_launch(&mut state);
                false
            }
        }
    }

    fn mark_launched(state: &mut TaskState, paused: bool) {
        state.status = if paused {
            TaskStatus::Waiting
        } else {
            TaskStatus::Running
        };
        state.gate_open = !paused;
        state.spawned = true;
        state.start_time = Some(Utc::now());
    }

    fn undo_launch(state: &mut TaskState) {
        state.status = TaskStatus::Pending;
        state.gate_open = false;
        state.spawned = false;
        state.start_time = None;
    }

    fn run(self: Arc<Self>) {
        {
            let mut state = self.state.lock();
            while !state.gate_open && !state.exit_requested {
                self.gate.wait(&mut state);
            }
            if state.exit_requested {
                debug!(task_id = %self.id, "Exit requested before dispatch");
                drop(state);
                self.conclude(None);
                return;
            }
        }

        let work = self.work.lock().take();
        let Some(work) = work else {
            warn!(task_id = %self.id, "Work function already consumed");
            self.conclude(None);
            return;
        };

        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TaskError::from_anyhow(&e)),
            Err(payload) => Err(TaskError::from_panic(payload.as_ref())),
        };
        self.conclude(Some(outcome));
    }

    fn conclude(&self, outcome: Option<std::result::Result<TaskOutput, TaskError>>) {
        let mut state = self.state.lock();
        match outcome {
            Some(Ok(value)) => {
                state.result = Some(value);
                if !state.status.is_terminal() {
                    state.status = TaskStatus::Completed;
                }
                debug!(task_id = %self.id, task = %self.name, "Task completed");
            }
            Some(Err(e)) => {
                error!(task_id = %self.id, task = %self.name, "Task failed: {}", e);
                state.error = Some(e);
                if !state.status.is_terminal() {
                    state.status = TaskStatus::Failed;
                }
            }
            None => {}
        }
        state.end_time = Some(Utc::now());
        state.finished = true;
        self.concluded.notify_all();
    }

    /// Close the resumption gate. Only valid while `Running`.
    ///
    /// Has no effect on a work function that is already executing.
    pub fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Running {
            return false;
        }
        state.gate_open = false;
        state.status = TaskStatus::Waiting;
        info!(task_id = %self.id, task = %self.name, "Task paused");
        true
    }

    /// Reopen the resumption gate. Only valid while `Waiting`.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Waiting {
            return false;
        }
        state.gate_open = true;
        state.status = TaskStatus::Running;
        self.gate.notify_all();
        info!(task_id = %self.id, task = %self.name, "Task resumed");
        true
    }

    /// Request cooperative exit and move to `Terminated`.
    ///
    /// A paused task is woken so it can observe the request. Returns `false`
    /// if the task was already in a terminal state, which is left unchanged.
    pub fn terminate(&self) -> bool {
        let mut state = self.state.lock();
        state.exit_requested = true;
        state.gate_open = true;
        self.gate.notify_all();

        if state.status.is_terminal() {
            return false;
        }
        state.status = TaskStatus::Terminated;
        info!(task_id = %self.id, task = %self.name, "Task termination requested");
        true
    }

    /// Block until the execution unit finishes or `timeout` elapses.
    ///
    /// A task terminated before it was ever started has nothing to wait for
    /// and returns immediately.
    pub fn join(&self, timeout: Option<Duration>) -> Result<()> {
        let mut state = self.state.lock();
        if !state.spawned {
            if state.status.is_terminal() {
                return Ok(());
            }
            return Err(Error::NotStarted {
                task: self.name.clone(),
            });
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        while !state.finished {
            match deadline {
                None => self.concluded.wait(&mut state),
                Some(deadline) => {
                    if self.concluded.wait_until(&mut state, deadline).timed_out()
                        && !state.finished
                    {
                        return Err(Error::timeout("task join", timeout.unwrap_or_default()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether the execution unit has been started and not yet finished
    pub fn is_alive(&self) -> bool {
        let state = self.state.lock();
        state.spawned && !state.finished
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().end_time
    }

    /// Seconds between start and end (or now); zero if never started
    pub fn runtime(&self) -> f64 {
        let state = self.state.lock();
        match state.start_time {
            None => 0.0,
            Some(start) => {
                let end = state.end_time.unwrap_or_else(Utc::now);
                (end - start).to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0)
            }
        }
    }

    /// Value returned by the work function, if it succeeded
    pub fn result(&self) -> Option<TaskOutput> {
        self.state.lock().result.clone()
    }

    /// Error captured from the work function, if it failed
    pub fn error(&self) -> Option<TaskError> {
        self.state.lock().error.clone()
    }

    /// Group this task currently belongs to
    pub fn group(&self) -> Option<Arc<TaskGroup>> {
        self.group.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn group_name(&self) -> Option<String> {
        self.group().map(|g| g.name().to_string())
    }

    pub fn to_record(&self) -> TaskRecord {
        let group_name = self.group_name();
        let runtime_seconds = self.runtime();
        let state = self.state.lock();
        TaskRecord {
            id: self.id,
            name: self.name.clone(),
            status: state.status,
            priority: self.priority,
            runtime_seconds,
            group_name,
            start_time: state.start_time,
            has_error: state.error.is_some(),
        }
    }
}

impl fmt::Debug for ManagedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for ManagedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManagedTask({}, status={})", self.name, self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_launch_leaves_task_pending() {
        let task = ManagedTask::new(|| Ok(json!("second try")), None, TaskPriority::Normal);
        {
            let mut state = task.state.lock();
            ManagedTask::mark_launched(&mut state, false);
            ManagedTask::undo_launch(&mut state);
        }

        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(task.start_time().is_none());
        assert!(task.error().is_none());
        assert!(matches!(
            task.join(Some(Duration::from_millis(10))),
            Err(Error::NotStarted { .. })
        ));

        assert!(task.start(), "a rolled back launch can be retried");
        task.join(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.result(), Some(json!("second try")));
    }
}
