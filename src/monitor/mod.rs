//! Host resource monitoring.
//!
//! A [`ResourceSampler`] periodically reads a [`ResourceProbe`] and appends
//! the readings to a bounded [`ResourceHistory`].

pub mod history;
pub mod probe;
pub mod sampler;

pub use history::*;
pub use probe::*;
pub use sampler::*;
