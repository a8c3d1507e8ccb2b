//! Reusable, generation-counted rendezvous point.

use crate::error::{Error, Result};
use crate::task::types::panic_message;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Action run by the party that completes a generation.
///
/// It runs without the barrier lock held, so it may inspect the barrier, but
/// calling [`Barrier::wait`] on the same barrier from it never returns.
pub type BarrierAction = Box<dyn Fn() + Send + Sync + 'static>;

/// Shared handle to a barrier
pub type BarrierHandle = Arc<Barrier>;

/// Outcome of a successful [`Barrier::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    /// Generation this party took part in
    pub generation: u64,
    /// Whether this party completed the generation and ran the action
    pub is_leader: bool,
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    /// Set while the leader runs the action; new arrivals hold off until it clears
    releasing: bool,
}

/// Barrier releasing all parties together once `parties` have arrived.
///
/// Each party records the generation it arrived in and only counts a release
/// as its own once that generation has advanced, so stragglers of one cycle
/// never mix with the next.
pub struct Barrier {
    name: String,
    parties: usize,
    action: Option<BarrierAction>,
    default_timeout: Option<Duration>,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl Barrier {
    pub fn new(
        name: impl Into<String>,
        parties: usize,
        action: Option<BarrierAction>,
        default_timeout: Option<Duration>,
    ) -> Result<Self> {
        if parties == 0 {
            return Err(Error::Config("barrier needs at least one party".into()));
        }
        Ok(Self {
            name: name.into(),
            parties,
            action,
            default_timeout,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Parties currently waiting in the open generation
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Wait for the other parties.
    ///
    /// `timeout` falls back to the barrier's default. A party whose wait
    /// expires while its generation is still open withdraws its arrival and
    /// gets [`Error::Timeout`]; if the generation completed in the meantime
    /// the wait succeeds.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<BarrierWaitResult> {
        let timeout = timeout.or(self.default_timeout);
        let mut state = self.state.lock();
        while state.releasing {
            self.released.wait(&mut state);
        }
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.parties {
            // Nobody is released and nobody can arrive until the action returns.
            if let Some(action) = &self.action {
                state.releasing = true;
                let outcome =
                    MutexGuard::unlocked(&mut state, || panic::catch_unwind(AssertUnwindSafe(|| action())));
                state.releasing = false;
                if let Err(payload) = outcome {
                    error!(
                        barrier = %self.name,
                        "Barrier action panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            debug!(barrier = %self.name, generation, "Barrier released");
            return Ok(BarrierWaitResult {
                generation,
                is_leader: true,
            });
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        while state.generation == generation {
            match deadline {
                // A generation whose action is running is already complete.
                None => self.released.wait(&mut state),
                Some(_) if state.releasing => self.released.wait(&mut state),
                Some(deadline) => {
                    if self.released.wait_until(&mut state, deadline).timed_out()
                        && state.generation == generation
                        && !state.releasing
                    {
                        state.arrived -= 1;
                        warn!(barrier = %self.name, generation, "Barrier wait timed out");
                        return Err(Error::timeout("barrier wait", timeout.unwrap_or_default()));
                    }
                }
            }
        }

        Ok(BarrierWaitResult {
            generation,
            is_leader: false,
        })
    }
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Barrier")
            .field("name", &self.name)
            .field("parties", &self.parties)
            .field("arrived", &state.arrived)
            .field("generation", &state.generation)
            .finish()
    }
}
