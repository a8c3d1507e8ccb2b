//! # threadkeeper
//!
//! Managed concurrency for thread-based workloads: tasks with an explicit
//! lifecycle, worker pools returning futures, and the synchronization
//! primitives needed to coordinate them, all tracked by a central registry.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: Managed tasks with cooperative pause/resume/terminate, and named groups
//! - **[`pool`]**: Fixed-size worker pools and the single-assignment futures they return
//! - **[`sync`]**: Barrier, counting semaphore and an in-process event bus
//! - **[`monitor`]**: Background CPU and memory sampling into a bounded history
//! - **[`registry`]**: The registry owning all of the above, plus session logs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use threadkeeper::{Registry, TaskPriority, TaskSpec};
//!
//! fn main() -> threadkeeper::Result<()> {
//!     let registry = Registry::new();
//!
//!     let task = registry.create_task(
//!         || Ok(json!("indexed")),
//!         TaskSpec::named("indexer").in_group("batch").auto_start(),
//!     );
//!     task.join(None)?;
//!
//!     let pool = registry.create_pool(Some(4), None)?;
//!     let future = pool.submit(|| Ok(json!(42)), TaskPriority::High, None)?;
//!     assert_eq!(future.result(None)?, json!(42));
//!
//!     registry.save_session_log(threadkeeper::env::SESSION_LOG_FILE_NAME);
//!     Ok(())
//! }
//! ```

/// Configuration loading and discovery.
pub mod config;

/// Environment constants, default values and path utilities.
pub mod env;

/// Error types shared by every module.
pub mod error;

/// Log subscriber setup for embedding applications.
pub mod logging;

/// Host resource sampling.
pub mod monitor;

/// Worker pools and task futures.
pub mod pool;

/// Central registry of tasks, groups, pools and primitives.
pub mod registry;

/// Barrier, semaphore and event bus.
pub mod sync;

/// Managed tasks and task groups.
pub mod task;

pub use config::{ConfigDiscovery, PoolConfig, RegistryConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use monitor::{ResourceProbe, ResourceReading, SystemProbe};
pub use pool::{PoolStats, TaskFuture, WorkerPool};
pub use registry::{Registry, SessionLog, SystemStats, TaskSpec, TaskStatsSnapshot};
pub use sync::{Barrier, CountingSemaphore, EventBus};
pub use task::{ManagedTask, TaskError, TaskGroup, TaskPriority, TaskStatus};
