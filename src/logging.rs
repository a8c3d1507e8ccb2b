//! Log output setup.
//!
//! The library only emits `tracing` events. Nothing is printed until the
//! embedding application installs a subscriber, either its own or the one
//! built by [`init_logging`].

use crate::env;
use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `directive`; without either the filter
/// defaults to `threadkeeper=info`. Fails if a global subscriber is already set.
pub fn init_logging(directive: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive.unwrap_or(env::DEFAULT_LOG_DIRECTIVE)))
        .map_err(|e| Error::Config(format!("invalid log filter: {}", e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Only this test installs a subscriber in the unit test binary.
        assert!(init_logging(Some("threadkeeper=debug")).is_ok());
        assert!(init_logging(None).is_err());
    }
}
