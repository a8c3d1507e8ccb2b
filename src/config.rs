//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./threadkeeper.toml or ./.threadkeeper/config.toml
//! 2. User config: ~/.threadkeeper/config.toml
//! 3. Built-in defaults

use crate::env;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Settings for worker pools created through the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker count used when a pool is created without one
    pub default_max_workers: Option<usize>,
    /// How long an idle worker blocks on the queue before re-checking shutdown
    pub poll_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_max_workers: None,
            poll_interval_ms: env::pool::DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PoolConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolve the worker count for a new pool
    pub fn worker_count(&self, requested: Option<usize>) -> usize {
        requested
            .or(self.default_max_workers)
            .filter(|n| *n > 0)
            .unwrap_or_else(env::default_worker_count)
    }
}

/// Registry-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub tracking_interval_ms: u64,
    pub history_capacity: usize,
    pub sampler_error_backoff_ms: u64,
    pub stop_tracking_timeout_ms: u64,
    pub pool: PoolConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tracking_interval_ms: env::sampling::DEFAULT_INTERVAL_MS,
            history_capacity: env::sampling::DEFAULT_HISTORY_CAPACITY,
            sampler_error_backoff_ms: env::sampling::DEFAULT_ERROR_BACKOFF_MS,
            stop_tracking_timeout_ms: env::sampling::DEFAULT_STOP_TIMEOUT_MS,
            pool: PoolConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn tracking_interval(&self) -> Duration {
        Duration::from_millis(self.tracking_interval_ms)
    }

    pub fn sampler_error_backoff(&self) -> Duration {
        Duration::from_millis(self.sampler_error_backoff_ms)
    }

    pub fn stop_tracking_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_tracking_timeout_ms)
    }

    /// Reject values the sampler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(Error::Config("history_capacity must be at least 1".into()));
        }
        if self.tracking_interval_ms == 0 {
            return Err(Error::Config("tracking_interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: RegistryConfig =
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<RegistryConfig> {
        let current_dir = std_env::current_dir().ok();
        Self::discover_config_in(current_dir.as_deref(), Self::get_home_dir().as_deref())
    }

    /// Discover configuration relative to explicit working and home directories
    pub fn discover_config_in(
        current_dir: Option<&Path>,
        home_dir: Option<&Path>,
    ) -> Result<RegistryConfig> {
        if let Some(config_path) = Self::find_config_file_in(current_dir, home_dir) {
            info!("Loading configuration from: {:?}", config_path);
            return RegistryConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(RegistryConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        let current_dir = std_env::current_dir().ok();
        Self::find_config_file_in(current_dir.as_deref(), Self::get_home_dir().as_deref())
    }

    pub fn find_config_file_in(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Option<PathBuf> {
        for candidate in Self::get_config_candidates(current_dir, home_dir) {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Configuration file candidates in priority order
    fn get_config_candidates(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(env::local_config_file_path(current_dir));
            candidates.push(env::config_file_path(current_dir));
        }

        if let Some(home_dir) = home_dir {
            candidates.push(env::config_file_path(home_dir));
        }

        candidates
    }

    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }
}
