use crate::monitor::probe::ResourceReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Timestamped value in a resource series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Bounded CPU and memory series; the oldest sample is evicted on overflow
#[derive(Debug, Clone)]
pub struct ResourceHistory {
    capacity: usize,
    cpu: VecDeque<ResourceSample>,
    memory: VecDeque<ResourceSample>,
}

impl ResourceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            cpu: VecDeque::with_capacity(capacity),
            memory: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&mut self, timestamp: DateTime<Utc>, reading: &ResourceReading) {
        Self::push(&mut self.cpu, self.capacity, timestamp, reading.cpu_percent);
        Self::push(&mut self.memory, self.capacity, timestamp, reading.memory_percent);
    }

    fn push(series: &mut VecDeque<ResourceSample>, capacity: usize, timestamp: DateTime<Utc>, value: f64) {
        while series.len() >= capacity {
            series.pop_front();
        }
        series.push_back(ResourceSample { timestamp, value });
    }

    pub fn cpu(&self) -> Vec<ResourceSample> {
        self.cpu.iter().copied().collect()
    }

    pub fn memory(&self) -> Vec<ResourceSample> {
        self.memory.iter().copied().collect()
    }

    /// Timestamp of the oldest retained sample
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.cpu.front().map(|s| s.timestamp)
    }

    pub fn len(&self) -> usize {
        self.cpu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty()
    }
}
