//! Log output for embedders and tests
//!
//! The library only emits `tracing` events; this installs a subscriber for
//! binaries that do not bring their own.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info,seclabel=debug";

/// Install a global `tracing` subscriber
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(json, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_cleanly() {
        // Whichever call comes second must report an error, not panic.
        let first = init_logging(false);
        let second = init_logging(true);
        assert!(first.is_err() || second.is_err());
    }
}
