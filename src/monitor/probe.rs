//! System resource readings.
//!
//! [`ResourceProbe`] is the seam between the sampler and the operating
//! system; [`SystemProbe`] is the real implementation backed by `sysinfo`.

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// One reading of machine-wide utilization
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceReading {
    /// Global CPU usage in percent
    pub cpu_percent: f64,
    /// Used memory in bytes
    pub memory_used: u64,
    /// Total memory in bytes
    pub memory_total: u64,
    /// Used memory in percent of total
    pub memory_percent: f64,
}

impl ResourceReading {
    pub fn new(cpu_percent: f64, memory_used: u64, memory_total: u64) -> Self {
        let memory_percent = if memory_total == 0 {
            0.0
        } else {
            memory_used as f64 / memory_total as f64 * 100.0
        };
        Self {
            cpu_percent,
            memory_used,
            memory_total,
            memory_percent,
        }
    }
}

/// Source of resource readings
pub trait ResourceProbe: Send {
    fn read(&mut self) -> anyhow::Result<ResourceReading>;
}

/// Probe reading the host through `sysinfo`.
///
/// CPU usage is measured between consecutive reads, so the very first
/// reading reports 0%.
pub struct SystemProbe {
    system: System,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn read(&mut self) -> anyhow::Result<ResourceReading> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let memory_total = self.system.total_memory();
        if memory_total == 0 {
            anyhow::bail!("memory information unavailable on this platform");
        }
        Ok(ResourceReading::new(
            f64::from(self.system.global_cpu_usage()),
            self.system.used_memory(),
            memory_total,
        ))
    }
}
