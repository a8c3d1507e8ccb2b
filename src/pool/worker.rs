//! Fixed-size pool of persistent workers draining a FIFO queue.
//!
//! Each worker takes one queued task, starts it, joins it and resolves the
//! matching [`TaskFuture`] before taking the next one. Parallelism comes from
//! running several workers, never from overlapping tasks within one worker.

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::pool::future::TaskFuture;
use crate::task::types::panic_message;
use crate::task::{ManagedTask, TaskError, TaskHandle, TaskOutput, TaskPriority, TaskStatus};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Unique identifier for pools
pub type PoolId = Uuid;

/// Shared handle to a worker pool
pub type PoolHandle = Arc<WorkerPool>;

/// Point-in-time statistics of a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub id: PoolId,
    pub name: String,
    pub max_workers: usize,
    pub active_workers: usize,
    pub queue_size: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_tasks: u64,
    pub uptime_seconds: f64,
}

struct QueuedTask {
    task: TaskHandle,
    future: TaskFuture,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueuedTask>,
    active_workers: usize,
    /// Every thread that has ever run a worker loop of this pool
    worker_threads: HashSet<ThreadId>,
}

pub struct WorkerPool {
    id: PoolId,
    name: String,
    max_workers: usize,
    poll_interval: Duration,
    created_at: Instant,
    queue: Mutex<QueueState>,
    /// Signalled when work is queued or shutdown begins
    available: Condvar,
    /// Signalled when a worker exits
    worker_exited: Condvar,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool with default settings; workers are not started yet
    pub fn new(max_workers: Option<usize>, name: Option<String>) -> PoolHandle {
        Self::with_config(max_workers, name, &PoolConfig::default())
    }

    pub fn with_config(
        max_workers: Option<usize>,
        name: Option<String>,
        config: &PoolConfig,
    ) -> PoolHandle {
        let id = Uuid::new_v4();
        let name = name.unwrap_or_else(|| format!("Pool-{}", &id.simple().to_string()[..8]));
        let max_workers = config.worker_count(max_workers);
        info!(pool = %name, max_workers, "Worker pool created");

        Arc::new(Self {
            id,
            name,
            max_workers,
            poll_interval: config.poll_interval(),
            created_at: Instant::now(),
            queue: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            worker_exited: Condvar::new(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Spawn the configured number of workers. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::PoolShutdown {
                pool: self.name.clone(),
            });
        }

        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return Ok(());
        }

        for index in 0..self.max_workers {
            let pool = Arc::clone(self);
            // Counted before spawning so a worker exiting early cannot underflow.
            self.queue.lock().active_workers += 1;
            let spawned = thread::Builder::new()
                .name(format!("{}-Worker-{}", self.name, index))
                .spawn(move || pool.worker_loop(index));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    self.queue.lock().active_workers -= 1;
                    error!(pool = %self.name, worker = index, "Failed to spawn worker: {}", e);
                    return Err(e.into());
                }
            }
        }

        info!(pool = %self.name, workers = workers.len(), "Worker pool started");
        Ok(())
    }

    fn worker_loop(self: Arc<Self>, index: usize) {
        self.queue.lock().worker_threads.insert(thread::current().id());
        debug!(pool = %self.name, worker = index, "Worker started");
        loop {
            let next = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(item) = queue.items.pop_front() {
                        break Some(item);
                    }
                    // Queued work is drained before a shutdown is honoured.
                    if self.is_shutdown() {
                        break None;
                    }
                    self.available.wait_for(&mut queue, self.poll_interval);
                }
            };

            let Some(item) = next else {
                break;
            };

            self.run_item(item);
        }

        let mut queue = self.queue.lock();
        queue.active_workers -= 1;
        self.worker_exited.notify_all();
        debug!(pool = %self.name, worker = index, "Worker exited");
    }

    fn run_item(&self, item: QueuedTask) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(item))) {
            error!(
                pool = %self.name,
                "Worker dispatch error: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    fn dispatch(&self, QueuedTask { task, future }: QueuedTask) {
        // A task started elsewhere is still joined so its real outcome is reported.
        if !task.start() {
            debug!(pool = %self.name, task_id = %task.id(), status = %task.status(), "Task was not pending at dispatch");
        }
        let outcome = match task.join(None) {
            Ok(()) => Self::outcome_of(&task),
            Err(e) => {
                warn!(pool = %self.name, task_id = %task.id(), "Join failed: {}", e);
                Err(TaskError::execution(e.to_string()))
            }
        };

        let resolved = match outcome {
            Ok(value) => {
                self.completed.fetch_add(1, Ordering::AcqRel);
                future.set_result(value)
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                future.set_exception(e)
            }
        };
        if let Err(e) = resolved {
            error!(pool = %self.name, task_id = %task.id(), "Could not resolve future: {}", e);
        }
    }

    fn outcome_of(task: &ManagedTask) -> std::result::Result<TaskOutput, TaskError> {
        if let Some(e) = task.error() {
            return Err(e);
        }
        match task.result() {
            Some(value) => Ok(value),
            None if task.status() == TaskStatus::Terminated => Err(TaskError::Terminated),
            None => Ok(TaskOutput::Null),
        }
    }

    /// Queue a new task built from `work` and return its future immediately
    pub fn submit<F>(
        &self,
        work: F,
        priority: TaskPriority,
        name: Option<String>,
    ) -> Result<TaskFuture>
    where
        F: FnOnce() -> anyhow::Result<TaskOutput> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(Error::PoolShutdown {
                pool: self.name.clone(),
            });
        }
        self.submit_task(ManagedTask::new(work, name, priority))
    }

    /// Queue an already constructed task.
    ///
    /// If the task is terminated before a worker reaches it, its future is
    /// resolved with [`TaskError::Terminated`].
    pub fn submit_task(&self, task: TaskHandle) -> Result<TaskFuture> {
        let future = TaskFuture::new();
        {
            let mut queue = self.queue.lock();
            // Checked under the queue lock so no submission slips in after shutdown.
            if self.is_shutdown() {
                return Err(Error::PoolShutdown {
                    pool: self.name.clone(),
                });
            }
            // Counted before the push so completed + failed never exceeds submitted.
            self.submitted.fetch_add(1, Ordering::AcqRel);
            queue.items.push_back(QueuedTask {
                task,
                future: future.clone(),
            });
        }
        self.available.notify_one();
        Ok(future)
    }

    /// Stop accepting work; with `wait`, block until queued work is drained
    /// and every worker has exited.
    ///
    /// Work queued on a pool that was never started is run on the calling
    /// thread by `shutdown(true)`. Called from one of the pool's own workers
    /// (e.g. from a future callback), `shutdown(true)` does not wait.
    pub fn shutdown(&self, wait: bool) {
        {
            let _queue = self.queue.lock();
            if !self.shutdown.swap(true, Ordering::AcqRel) {
                info!(pool = %self.name, "Worker pool shutting down");
            }
        }
        self.available.notify_all();

        if !wait {
            return;
        }

        let current = thread::current().id();
        if self.queue.lock().worker_threads.contains(&current) {
            warn!(pool = %self.name, "shutdown(wait) called from a worker thread; not waiting");
            return;
        }

        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if handle.join().is_err() {
                error!(pool = %self.name, "Worker thread panicked");
            }
        }

        // Another caller may have taken the handles; wait on the exit count instead.
        let leftovers: Vec<QueuedTask> = {
            let mut queue = self.queue.lock();
            while queue.active_workers > 0 {
                self.worker_exited.wait(&mut queue);
            }
            queue.items.drain(..).collect()
        };

        // Only reachable when no worker ever ran.
        if !leftovers.is_empty() {
            warn!(
                pool = %self.name,
                queued = leftovers.len(),
                "No workers running; draining queued tasks on the calling thread"
            );
            for item in leftovers {
                self.run_item(item);
            }
        }
        info!(pool = %self.name, "Worker pool shut down");
    }

    pub fn stats(&self) -> PoolStats {
        let (queue_size, active_workers) = {
            let queue = self.queue.lock();
            (queue.items.len(), queue.active_workers)
        };
        PoolStats {
            id: self.id,
            name: self.name.clone(),
            max_workers: self.max_workers,
            active_workers,
            queue_size,
            completed_tasks: self.completed.load(Ordering::Acquire),
            failed_tasks: self.failed.load(Ordering::Acquire),
            total_tasks: self.submitted.load(Ordering::Acquire),
            uptime_seconds: self.created_at.elapsed().as_secs_f64(),
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("max_workers", &self.max_workers)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
