//! Background loop sampling CPU and memory into a bounded history.

use crate::error::Result;
use crate::monitor::history::ResourceHistory;
use crate::monitor::probe::ResourceProbe;
use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Probe shared between the sampler thread and on-demand readers
pub type SharedProbe = Arc<Mutex<Box<dyn ResourceProbe>>>;

/// History shared between the sampler thread and readers
pub type SharedHistory = Arc<Mutex<ResourceHistory>>;

/// Timing of the sampling loop
#[derive(Debug, Clone, Copy)]
pub struct SamplerTiming {
    pub interval: Duration,
    pub error_backoff: Duration,
    pub stop_timeout: Duration,
}

#[derive(Debug, Default)]
struct ControlState {
    active: bool,
    /// Bumped on every start so a loop that outlived its stop cannot resume
    epoch: u64,
    exited: bool,
}

impl ControlState {
    fn runs(&self, epoch: u64) -> bool {
        self.active && self.epoch == epoch
    }
}

/// Stop requests and exit notifications travel through the same condvar.
#[derive(Debug, Default)]
struct SamplerControl {
    state: Mutex<ControlState>,
    signal: Condvar,
}

pub struct ResourceSampler {
    probe: SharedProbe,
    history: SharedHistory,
    timing: SamplerTiming,
    control: Arc<SamplerControl>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceSampler {
    pub fn new(probe: SharedProbe, history: SharedHistory, timing: SamplerTiming) -> Self {
        Self {
            probe,
            history,
            timing,
            control: Arc::new(SamplerControl::default()),
            handle: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.control.state.lock().active
    }

    /// Spawn the sampling thread; returns `false` if it is already running
    pub fn start(&self) -> Result<bool> {
        let mut handle = self.handle.lock();
        let epoch = {
            let mut state = self.control.state.lock();
            if state.active {
                return Ok(false);
            }
            state.active = true;
            state.epoch += 1;
            state.exited = false;
            state.epoch
        };

        // A previous loop that outlived its stop timeout is left detached.
        handle.take();

        let probe = Arc::clone(&self.probe);
        let history = Arc::clone(&self.history);
        let control = Arc::clone(&self.control);
        let timing = self.timing;
        let spawned = thread::Builder::new()
            .name("ResourceTracker".to_string())
            .spawn(move || {
                Self::run(&probe, &history, &control, timing, epoch);
                let mut state = control.state.lock();
                if state.epoch == epoch {
                    state.exited = true;
                    control.signal.notify_all();
                }
            });

        match spawned {
            Ok(join_handle) => {
                *handle = Some(join_handle);
                info!("Resource tracking started");
                Ok(true)
            }
            Err(e) => {
                self.control.state.lock().active = false;
                Err(e.into())
            }
        }
    }

    fn run(
        probe: &SharedProbe,
        history: &SharedHistory,
        control: &SamplerControl,
        timing: SamplerTiming,
        epoch: u64,
    ) {
        loop {
            if !control.state.lock().runs(epoch) {
                return;
            }

            let reading = probe.lock().read();
            let pause = match reading {
                Ok(reading) => {
                    history.lock().record(Utc::now(), &reading);
                    timing.interval
                }
                Err(e) => {
                    error!("Error in resource tracking: {:#}", e);
                    timing.error_backoff
                }
            };

            let mut state = control.state.lock();
            if !state.runs(epoch) {
                return;
            }
            // Woken early by stop().
            control.signal.wait_for(&mut state, pause);
        }
    }

    /// Stop the sampling thread, waiting at most the configured stop timeout.
    ///
    /// Returns `false` if tracking was not active.
    pub fn stop(&self) -> bool {
        {
            let mut state = self.control.state.lock();
            if !state.active {
                return false;
            }
            state.active = false;
            self.control.signal.notify_all();
        }

        let deadline = Instant::now() + self.timing.stop_timeout;
        let exited = {
            let mut state = self.control.state.lock();
            while !state.exited {
                if self.control.signal.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            state.exited
        };

        let handle = self.handle.lock().take();
        match (exited, handle) {
            (true, Some(handle)) => {
                if handle.join().is_err() {
                    error!("Resource tracking thread panicked");
                }
            }
            (false, Some(_)) => {
                warn!(
                    "Resource tracking thread did not stop within {:?}",
                    self.timing.stop_timeout
                );
            }
            (_, None) => debug!("No resource tracking thread to join"),
        }
        info!("Resource tracking stopped");
        true
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::probe::ResourceReading;

    struct SequenceProbe {
        next: f64,
        failures_left: usize,
    }

    impl ResourceProbe for SequenceProbe {
        fn read(&mut self) -> anyhow::Result<ResourceReading> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                anyhow::bail!("sensor unavailable");
            }
            self.next += 1.0;
            Ok(ResourceReading::new(self.next, 50, 100))
        }
    }

    fn sampler(failures: usize, capacity: usize) -> (ResourceSampler, SharedHistory) {
        let probe: Box<dyn ResourceProbe> = Box::new(SequenceProbe {
            next: 0.0,
            failures_left: failures,
        });
        let probe: SharedProbe = Arc::new(Mutex::new(probe));
        let history = Arc::new(Mutex::new(ResourceHistory::new(capacity)));
        let timing = SamplerTiming {
            interval: Duration::from_millis(5),
            error_backoff: Duration::from_millis(5),
            stop_timeout: Duration::from_secs(2),
        };
        (
            ResourceSampler::new(probe, Arc::clone(&history), timing),
            history,
        )
    }

    fn wait_for_samples(history: &SharedHistory, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while history.lock().len() < count {
            assert!(Instant::now() < deadline, "sampler produced too few samples");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_start_and_stop() {
        let (sampler, history) = sampler(0, 60);

        assert!(sampler.start().unwrap());
        assert!(!sampler.start().unwrap(), "second start is rejected");
        assert!(sampler.is_active());

        wait_for_samples(&history, 3);
        assert!(sampler.stop());
        assert!(!sampler.is_active());
        assert!(!sampler.stop());

        let len = history.lock().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(history.lock().len(), len, "no samples after stop");
    }

    #[test]
    fn test_history_stays_bounded() {
        let (sampler, history) = sampler(0, 4);
        sampler.start().unwrap();
        wait_for_samples(&history, 4);
        thread::sleep(Duration::from_millis(40));
        sampler.stop();

        let history = history.lock();
        assert_eq!(history.len(), 4);
        let values: Vec<f64> = history.cpu().iter().map(|s| s.value).collect();
        assert!(values.windows(2).all(|w| w[1] == w[0] + 1.0));
        assert!(values[0] > 1.0, "oldest samples were evicted");
    }

    #[test]
    fn test_sampling_errors_back_off_and_retry() {
        let (sampler, history) = sampler(3, 60);
        sampler.start().unwrap();
        wait_for_samples(&history, 2);
        sampler.stop();

        assert_eq!(history.lock().cpu()[0].value, 1.0);
    }

    #[test]
    fn test_restart_after_stop() {
        let (sampler, history) = sampler(0, 60);
        sampler.start().unwrap();
        wait_for_samples(&history, 1);
        sampler.stop();

        let before = history.lock().len();
        assert!(sampler.start().unwrap());
        wait_for_samples(&history, before + 1);
        sampler.stop();
    }
}
