//! Single-assignment result container handed back by [`WorkerPool::submit`].
//!
//! [`WorkerPool::submit`]: crate::pool::WorkerPool::submit

use crate::error::{Error, Result};
use crate::task::types::panic_message;
use crate::task::{TaskError, TaskOutput};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, warn};

type Outcome = std::result::Result<TaskOutput, TaskError>;

/// Callback invoked once the future is resolved
pub type DoneCallback = Box<dyn FnOnce(&TaskFuture) -> anyhow::Result<()> + Send + 'static>;

/// Eventual result or error of a submitted task.
///
/// Cloning yields another handle to the same slot. The slot is written at
/// most once: the first `set_result`/`set_exception` wins and any later call
/// is rejected with [`Error::AlreadyResolved`].
#[derive(Clone)]
pub struct TaskFuture {
    inner: Arc<FutureInner>,
}

struct FutureInner {
    state: Mutex<FutureState>,
    resolved: Condvar,
    done_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct FutureState {
    outcome: Option<Outcome>,
    callbacks: Vec<DoneCallback>,
}

impl TaskFuture {
    pub fn new() -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(FutureInner {
                state: Mutex::new(FutureState::default()),
                resolved: Condvar::new(),
                done_tx,
            }),
        }
    }

    pub fn set_result(&self, value: TaskOutput) -> Result<()> {
        self.resolve(Ok(value))
    }

    pub fn set_exception(&self, error: TaskError) -> Result<()> {
        self.resolve(Err(error))
    }

    fn resolve(&self, outcome: Outcome) -> Result<()> {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                warn!("Attempt to resolve a future that is already done");
                return Err(Error::AlreadyResolved);
            }
            state.outcome = Some(outcome);
            self.inner.resolved.notify_all();
            std::mem::take(&mut state.callbacks)
        };
        self.inner.done_tx.send_replace(true);

        // Outside the lock so callbacks may call back into this future.
        for callback in callbacks {
            self.invoke(callback);
        }
        Ok(())
    }

    fn invoke(&self, callback: DoneCallback) {
        match panic::catch_unwind(AssertUnwindSafe(|| callback(self))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Error in future callback: {:#}", e),
            Err(payload) => error!(
                "Future callback panicked: {}",
                panic_message(payload.as_ref())
            ),
        }
    }

    /// Register a callback; runs immediately on this thread if already done
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&TaskFuture) -> anyhow::Result<()> + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if state.outcome.is_none() {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        self.invoke(Box::new(callback));
    }

    fn wait_outcome(&self, timeout: Option<Duration>) -> Result<Outcome> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = state.outcome.as_ref() {
                return Ok(outcome.clone());
            }
            match deadline {
                None => self.inner.resolved.wait(&mut state),
                Some(deadline) => {
                    if self.inner.resolved.wait_until(&mut state, deadline).timed_out()
                        && state.outcome.is_none()
                    {
                        return Err(Error::timeout(
                            "future result",
                            timeout.unwrap_or_default(),
                        ));
                    }
                }
            }
        }
    }

    /// Block until resolved; a task failure comes back as [`Error::Task`]
    pub fn result(&self, timeout: Option<Duration>) -> Result<TaskOutput> {
        self.wait_outcome(timeout)?.map_err(Error::Task)
    }

    /// Block until resolved and return the captured error, if any
    pub fn exception(&self, timeout: Option<Duration>) -> Result<Option<TaskError>> {
        Ok(self.wait_outcome(timeout)?.err())
    }

    /// Await resolution from async code without blocking the runtime
    pub async fn result_async(&self) -> Result<TaskOutput> {
        let mut done_rx = self.inner.done_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once done.
        let _ = done_rx.wait_for(|done| *done).await;
        self.result(Some(Duration::ZERO))
    }

    pub fn done(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// Futures cannot retract queued or running work; use
    /// [`ManagedTask::terminate`](crate::task::ManagedTask::terminate) instead.
    pub fn cancel(&self) -> bool {
        false
    }
}

impl Default for TaskFuture {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskFuture")
            .field("outcome", &state.outcome)
            .field("pending_callbacks", &state.callbacks.len())
            .finish()
    }
}
