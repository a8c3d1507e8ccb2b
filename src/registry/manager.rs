use crate::config::{ConfigDiscovery, RegistryConfig};
use crate::env::events;
use crate::error::Result;
use crate::monitor::{
    ResourceHistory, ResourceProbe, ResourceReading, ResourceSampler, SamplerTiming, SharedHistory,
    SharedProbe, SystemProbe,
};
use crate::pool::{PoolHandle, PoolId, PoolStats, WorkerPool};
use crate::registry::session_log::write_session_log;
use crate::registry::types::*;
use crate::sync::{Barrier, BarrierAction, BarrierHandle, CountingSemaphore, EventBus, SemaphoreHandle};
use crate::task::*;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct RegistryMaps {
    tasks: HashMap<TaskId, TaskHandle>,
    groups: HashMap<String, GroupHandle>,
    pools: HashMap<PoolId, PoolHandle>,
    barriers: HashMap<String, BarrierHandle>,
    semaphores: HashMap<String, SemaphoreHandle>,
}

/// Central registry of managed tasks, groups, pools and primitives.
///
/// All maps sit behind one lock. Anything that can block, such as starting
/// threads, joining or shutting down pools, happens after the lock is
/// released, on handles snapshotted while it was held.
pub struct Registry {
    config: RegistryConfig,
    inner: Mutex<RegistryMaps>,
    event_bus: Arc<EventBus>,
    probe: SharedProbe,
    history: SharedHistory,
    sampler: ResourceSampler,
}

impl Registry {
    /// Registry with default settings reading the host through `sysinfo`
    pub fn new() -> Self {
        Self::build(RegistryConfig::default(), Box::new(SystemProbe::new()))
    }

    /// Registry configured from the first file found by [`ConfigDiscovery`]
    pub fn discover() -> Result<Self> {
        Self::with_config(ConfigDiscovery::discover_config()?)
    }

    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        Self::with_probe(config, Box::new(SystemProbe::new()))
    }

    /// Registry sampling resources from a custom probe
    pub fn with_probe(config: RegistryConfig, probe: Box<dyn ResourceProbe>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, probe))
    }

    fn build(config: RegistryConfig, probe: Box<dyn ResourceProbe>) -> Self {
        let probe: SharedProbe = Arc::new(Mutex::new(probe));
        let history = Arc::new(Mutex::new(ResourceHistory::new(config.history_capacity)));
        let timing = SamplerTiming {
            interval: config.tracking_interval(),
            error_backoff: config.sampler_error_backoff(),
            stop_timeout: config.stop_tracking_timeout(),
        };
        let sampler = ResourceSampler::new(Arc::clone(&probe), Arc::clone(&history), timing);

        Self {
            config,
            inner: Mutex::new(RegistryMaps::default()),
            event_bus: Arc::new(EventBus::new()),
            probe,
            history,
            sampler,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Bus carrying the registry's lifecycle events
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Register a new task, joining (and creating) its group if one is named
    pub fn create_task<F>(&self, work: F, spec: TaskSpec) -> TaskHandle
    where
        F: FnOnce() -> anyhow::Result<TaskOutput> + Send + 'static,
    {
        let task = ManagedTask::new(work, spec.name, spec.priority);
        let mut created_group = None;

        {
            let mut maps = self.inner.lock();
            if let Some(group_name) = spec.group {
                let group = match maps.groups.get(&group_name) {
                    Some(group) => Arc::clone(group),
                    None => {
                        let group = TaskGroup::new(group_name.clone(), "");
                        maps.groups.insert(group_name, Arc::clone(&group));
                        created_group = Some(Arc::clone(&group));
                        group
                    }
                };
                group.add(&task);
            }
            maps.tasks.insert(task.id(), Arc::clone(&task));
        }

        if let Some(group) = created_group {
            self.publish_group_created(&group);
        }
        debug!("Registered task {} ({})", task.name(), task.id());
        self.event_bus.publish(
            events::TASK_CREATED,
            &json!({
                "id": task.id(),
                "name": task.name(),
                "priority": task.priority(),
                "group": task.group_name(),
            }),
        );

        if spec.auto_start && task.start() {
            self.event_bus.publish(
                events::TASK_STARTED,
                &json!({ "id": task.id(), "name": task.name() }),
            );
        }
        task
    }

    /// Create a group, or return the existing one with that name
    pub fn create_group(&self, name: &str, description: &str) -> GroupHandle {
        let group = {
            let mut maps = self.inner.lock();
            if let Some(existing) = maps.groups.get(name) {
                return Arc::clone(existing);
            }
            let group = TaskGroup::new(name, description);
            maps.groups.insert(name.to_string(), Arc::clone(&group));
            group
        };
        self.publish_group_created(&group);
        group
    }

    fn publish_group_created(&self, group: &GroupHandle) {
        info!("Created task group {}", group.name());
        self.event_bus.publish(
            events::GROUP_CREATED,
            &json!({ "id": group.id(), "name": group.name() }),
        );
    }

    /// Create, register and start a worker pool
    pub fn create_pool(&self, max_workers: Option<usize>, name: Option<String>) -> Result<PoolHandle> {
        let pool = WorkerPool::with_config(max_workers, name, &self.config.pool);
        pool.start()?;
        self.inner.lock().pools.insert(pool.id(), Arc::clone(&pool));

        self.event_bus.publish(
            events::POOL_CREATED,
            &json!({
                "id": pool.id(),
                "name": pool.name(),
                "max_workers": pool.max_workers(),
            }),
        );
        Ok(pool)
    }

    /// Create a barrier under `name`, replacing any barrier of the same name
    pub fn create_barrier(
        &self,
        name: &str,
        parties: usize,
        action: Option<BarrierAction>,
        timeout: Option<Duration>,
    ) -> Result<BarrierHandle> {
        let barrier = Arc::new(Barrier::new(name, parties, action, timeout)?);
        if let Some(previous) = self
            .inner
            .lock()
            .barriers
            .insert(name.to_string(), Arc::clone(&barrier))
        {
            warn!("Barrier {} replaced ({} parties waiting)", name, previous.arrived());
        }
        Ok(barrier)
    }

    /// Create a semaphore under `name`, replacing any semaphore of the same name
    pub fn create_semaphore(&self, name: &str, value: usize) -> SemaphoreHandle {
        let semaphore = Arc::new(CountingSemaphore::new(value, Some(name.to_string())));
        if self
            .inner
            .lock()
            .semaphores
            .insert(name.to_string(), Arc::clone(&semaphore))
            .is_some()
        {
            warn!("Semaphore {} replaced", name);
        }
        semaphore
    }

    pub fn get_task(&self, id: TaskId) -> Option<TaskHandle> {
        self.inner.lock().tasks.get(&id).cloned()
    }

    pub fn get_group(&self, name: &str) -> Option<GroupHandle> {
        self.inner.lock().groups.get(name).cloned()
    }

    pub fn get_pool(&self, id: PoolId) -> Option<PoolHandle> {
        self.inner.lock().pools.get(&id).cloned()
    }

    pub fn get_barrier(&self, name: &str) -> Option<BarrierHandle> {
        self.inner.lock().barriers.get(name).cloned()
    }

    pub fn get_semaphore(&self, name: &str) -> Option<SemaphoreHandle> {
        self.inner.lock().semaphores.get(name).cloned()
    }

    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.inner.lock().tasks.values().cloned().collect()
    }

    pub fn groups(&self) -> Vec<GroupHandle> {
        self.inner.lock().groups.values().cloned().collect()
    }

    pub fn pools(&self) -> Vec<PoolHandle> {
        self.inner.lock().pools.values().cloned().collect()
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<TaskHandle> {
        self.tasks()
            .into_iter()
            .filter(|task| task.status() == status)
            .collect()
    }

    /// Members of the named group; empty for an unknown group
    pub fn tasks_by_group(&self, group_name: &str) -> Vec<TaskHandle> {
        self.get_group(group_name)
            .map(|group| group.tasks())
            .unwrap_or_default()
    }

    pub fn group_stats(&self, group_name: &str) -> Option<StatusCounts> {
        self.get_group(group_name).map(|group| group.stats())
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools().iter().map(|pool| pool.stats()).collect()
    }

    pub fn task_stats(&self) -> TaskStatsSnapshot {
        let (tasks, groups, pools) = {
            let maps = self.inner.lock();
            (
                maps.tasks.values().cloned().collect::<Vec<_>>(),
                maps.groups.len(),
                maps.pools.len(),
            )
        };
        TaskStatsSnapshot {
            counts: StatusCounts::tally(tasks.iter().map(|task| task.status())),
            groups,
            pools,
        }
    }

    /// Fresh utilization reading plus the retained history.
    ///
    /// A failing probe is logged and reported as zeros.
    pub fn system_stats(&self) -> SystemStats {
        let reading = match self.probe.lock().read() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Failed to read system resources: {:#}", e);
                ResourceReading::default()
            }
        };
        let history = self.history.lock();
        SystemStats {
            cpu_usage: reading.cpu_percent,
            memory_used: reading.memory_used,
            memory_total: reading.memory_total,
            memory_percent: reading.memory_percent,
            cpu_history: history.cpu(),
            memory_history: history.memory(),
        }
    }

    /// Request termination of every task and shut down every pool without waiting.
    ///
    /// Returns how many tasks accepted the termination request.
    pub fn terminate_all(&self) -> usize {
        let (tasks, pools) = {
            let maps = self.inner.lock();
            (
                maps.tasks.values().cloned().collect::<Vec<_>>(),
                maps.pools.values().cloned().collect::<Vec<_>>(),
            )
        };

        let terminated = tasks.iter().filter(|task| task.terminate()).count();
        for pool in &pools {
            pool.shutdown(false);
        }

        info!(
            "Terminate requested for {} tasks, {} pools shut down",
            terminated,
            pools.len()
        );
        self.event_bus.publish(
            events::TERMINATE_ALL,
            &json!({ "tasks": terminated, "pools": pools.len() }),
        );
        terminated
    }

    /// Drop every finished task from the registry and from its group
    pub fn cleanup_completed(&self) -> usize {
        let removed: Vec<TaskHandle> = {
            let mut maps = self.inner.lock();
            let finished: Vec<TaskId> = maps
                .tasks
                .iter()
                .filter(|(_, task)| task.status().is_terminal())
                .map(|(id, _)| *id)
                .collect();
            finished
                .iter()
                .filter_map(|id| maps.tasks.remove(id))
                .collect()
        };

        for task in &removed {
            if let Some(group) = task.group() {
                group.remove(task);
            }
        }

        if !removed.is_empty() {
            info!("Cleaned up {} finished tasks", removed.len());
            self.event_bus
                .publish(events::CLEANUP, &json!({ "removed": removed.len() }));
        }
        removed.len()
    }

    /// Start background resource sampling; `false` if it is already running
    pub fn start_tracking(&self) -> Result<bool> {
        self.sampler.start()
    }

    /// Stop background resource sampling; `false` if it was not running
    pub fn stop_tracking(&self) -> bool {
        self.sampler.stop()
    }

    pub fn is_tracking(&self) -> bool {
        self.sampler.is_active()
    }

    /// Snapshot of everything a session log records
    pub fn session_log(&self) -> SessionLog {
        let now = Utc::now();
        let duration = self
            .history
            .lock()
            .first_timestamp()
            .map(|first| (now - first).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionLog {
            timestamp: now,
            duration,
            stats: self.task_stats(),
            system: self.system_stats(),
            pools: self.pool_stats(),
            tasks: self
                .tasks()
                .iter()
                .map(|task| (task.id(), task.to_record()))
                .collect(),
        }
    }

    /// Write the session log as pretty JSON; failures are logged and reported as `false`
    pub fn save_session_log<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        match write_session_log(path, &self.session_log()) {
            Ok(bytes) => {
                info!("Session log saved to {} ({} bytes)", path.display(), bytes);
                true
            }
            Err(e) => {
                error!("Failed to save session log: {:#}", e);
                false
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // Idle workers only exit once their pool is shut down.
        for pool in self.inner.get_mut().pools.values() {
            pool.shutdown(false);
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let maps = self.inner.lock();
        f.debug_struct("Registry")
            .field("tasks", &maps.tasks.len())
            .field("groups", &maps.groups.len())
            .field("pools", &maps.pools.len())
            .field("barriers", &maps.barriers.len())
            .field("semaphores", &maps.semaphores.len())
            .field("tracking", &self.sampler.is_active())
            .finish()
    }
}
