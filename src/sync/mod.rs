//! Synchronization primitives shared between tasks.

pub mod barrier;
pub mod event_bus;
pub mod semaphore;

pub use barrier::*;
pub use event_bus::*;
pub use semaphore::*;
