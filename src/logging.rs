//! Logging setup for hosts embedding the measurement engine.
//!
//! The library only emits `tracing` events; nothing is printed unless the
//! host installs a subscriber, e.g. through [`init_logging`].

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber filtered by `RUST_LOG`.
///
/// # Arguments
///
/// * `default_directive` - Filter used when `RUST_LOG` is unset (e.g. `"info"`).
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed; callers that
/// may initialise twice can ignore it.
pub fn init_logging(default_directive: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = init_logging("warn");
        assert!(init_logging("warn").is_err());
    }
}
