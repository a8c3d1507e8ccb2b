//! Crate-wide error type.
//!
//! Failures local to a single task, callback or sampling cycle are contained
//! and logged where they happen. The variants here are the ones surfaced to
//! the immediate caller: illegal state transitions, expired deadlines and
//! I/O at the edges.

use crate::task::TaskError;
use std::time::Duration;

/// Errors returned by threadkeeper operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The work function of a task failed; carried through a future
    #[error("Task failed: {0}")]
    Task(#[from] TaskError),

    /// Submission rejected because the pool is shutting down
    #[error("Pool '{pool}' is already shutting down")]
    PoolShutdown { pool: String },

    /// A blocking wait exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A future was resolved a second time
    #[error("Future has already been resolved")]
    AlreadyResolved,

    /// More releases than the semaphore has permits
    #[error("Semaphore '{name}' released beyond its capacity of {capacity}")]
    SemaphoreOverRelease { name: String, capacity: usize },

    /// Joining a task whose execution unit was never started
    #[error("Task '{task}' has not been started")]
    NotStarted { task: String },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn timeout(operation: &'static str, after: Duration) -> Self {
        Error::Timeout { operation, after }
    }

    /// Whether this error is a deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
