//! Environment constants and path utilities for threadkeeper.
//!
//! This module centralizes the default intervals, capacities and file names
//! used throughout the crate, making them easier to maintain and modify.

use std::path::{Path, PathBuf};

/// Application directory name (hidden directory like .git, .vscode)
pub const APP_DIR_NAME: &str = ".threadkeeper";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "threadkeeper.toml";

/// Default session log file name
pub const SESSION_LOG_FILE_NAME: &str = "session_log.json";

/// Default tracing directive used by [`crate::logging::init_logging`]
pub const DEFAULT_LOG_DIRECTIVE: &str = "threadkeeper=info";

/// Resource sampling defaults
pub mod sampling {
    /// Interval between two resource samples
    pub const DEFAULT_INTERVAL_MS: u64 = 1_000;

    /// Number of samples kept per series before the oldest is evicted
    pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

    /// Pause after a failed sampling cycle
    pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 1_000;

    /// Upper bound on waiting for the sampler thread to exit
    pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 2_000;
}

/// Worker pool defaults
pub mod pool {
    /// How long an idle worker blocks on the queue before re-checking shutdown
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

    /// Hard cap on the automatically derived worker count
    pub const MAX_DEFAULT_WORKERS: usize = 32;

    /// Extra workers on top of the CPU count for the derived worker count
    pub const EXTRA_DEFAULT_WORKERS: usize = 4;
}

/// Event labels published on the registry's event bus
pub mod events {
    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_STARTED: &str = "task.started";
    pub const GROUP_CREATED: &str = "group.created";
    pub const POOL_CREATED: &str = "pool.created";
    pub const TERMINATE_ALL: &str = "registry.terminate_all";
    pub const CLEANUP: &str = "registry.cleanup";
}

/// Build the application directory path from a base directory
pub fn app_dir_path(base: &Path) -> PathBuf {
    base.join(APP_DIR_NAME)
}

/// Build the config file path inside the application directory of `base`
pub fn config_file_path(base: &Path) -> PathBuf {
    app_dir_path(base).join(CONFIG_FILE_NAME)
}

/// Build the local config file path (`./threadkeeper.toml`)
pub fn local_config_file_path(base: &Path) -> PathBuf {
    base.join(LOCAL_CONFIG_FILE_NAME)
}

/// Derive the worker count used when none is configured
pub fn default_worker_count() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus + pool::EXTRA_DEFAULT_WORKERS).min(pool::MAX_DEFAULT_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let base = Path::new("/home/user");
        assert_eq!(
            config_file_path(base),
            PathBuf::from("/home/user/.threadkeeper/config.toml")
        );
        assert_eq!(
            local_config_file_path(base),
            PathBuf::from("/home/user/threadkeeper.toml")
        );
    }

    #[test]
    fn test_default_worker_count_bounds() {
        let workers = default_worker_count();
        assert!(workers >= 1 + pool::EXTRA_DEFAULT_WORKERS);
        assert!(workers <= pool::MAX_DEFAULT_WORKERS);
    }
}
