//! Counting semaphore with optional owner bookkeeping.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared handle to a semaphore
pub type SemaphoreHandle = Arc<CountingSemaphore>;

#[derive(Debug)]
struct SemaphoreState {
    available: usize,
    /// Labels of current holders; observational only
    owners: BTreeSet<String>,
}

pub struct CountingSemaphore {
    name: String,
    capacity: usize,
    state: Mutex<SemaphoreState>,
    permit_released: Condvar,
}

impl CountingSemaphore {
    pub fn new(capacity: usize, name: Option<String>) -> Self {
        let name =
            name.unwrap_or_else(|| format!("Semaphore-{}", &Uuid::new_v4().simple().to_string()[..8]));
        Self {
            name,
            capacity,
            state: Mutex::new(SemaphoreState {
                available: capacity,
                owners: BTreeSet::new(),
            }),
            permit_released: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Labels registered by current holders, sorted
    pub fn owners(&self) -> Vec<String> {
        self.state.lock().owners.iter().cloned().collect()
    }

    /// Block until a permit is available or `timeout` elapses
    pub fn acquire(&self, timeout: Option<Duration>, owner: Option<&str>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while state.available == 0 {
            match deadline {
                None => self.permit_released.wait(&mut state),
                Some(deadline) => {
                    if self.permit_released.wait_until(&mut state, deadline).timed_out()
                        && state.available == 0
                    {
                        return Err(Error::timeout(
                            "semaphore acquire",
                            timeout.unwrap_or_default(),
                        ));
                    }
                }
            }
        }
        Self::take_permit(&mut state, owner);
        Ok(())
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self, owner: Option<&str>) -> bool {
        let mut state = self.state.lock();
        if state.available == 0 {
            return false;
        }
        Self::take_permit(&mut state, owner);
        true
    }

    fn take_permit(state: &mut SemaphoreState, owner: Option<&str>) {
        state.available -= 1;
        if let Some(owner) = owner {
            state.owners.insert(owner.to_string());
        }
    }

    /// Return a permit; releasing more than `capacity` permits is rejected
    pub fn release(&self, owner: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        if state.available >= self.capacity {
            warn!(semaphore = %self.name, "Release without matching acquire");
            return Err(Error::SemaphoreOverRelease {
                name: self.name.clone(),
                capacity: self.capacity,
            });
        }
        if let Some(owner) = owner {
            state.owners.remove(owner);
        }
        state.available += 1;
        self.permit_released.notify_one();
        Ok(())
    }

    /// Acquire a permit that is released when the guard goes out of scope
    pub fn guard(&self, owner: Option<&str>) -> Result<SemaphorePermit<'_>> {
        self.acquire(None, owner)?;
        Ok(SemaphorePermit {
            semaphore: self,
            owner: owner.map(str::to_string),
        })
    }
}

impl fmt::Debug for CountingSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CountingSemaphore")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("available", &state.available)
            .field("owners", &state.owners)
            .finish()
    }
}

/// Scoped permit; released on drop, including during unwinding
pub struct SemaphorePermit<'a> {
    semaphore: &'a CountingSemaphore,
    owner: Option<String>,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.semaphore.release(self.owner.as_deref()) {
            debug!("Scoped permit release failed: {}", e);
        }
    }
}
