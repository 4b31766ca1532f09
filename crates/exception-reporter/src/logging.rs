//! Log output for hosts that do not install their own subscriber.
//!
//! The reporter only emits `tracing` events. Hosts that already run a
//! subscriber keep it; these helpers use `try_init` and leave an existing
//! global subscriber in place.

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact single-line text.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Install a stderr subscriber at `level` (`RUST_LOG` takes precedence).
///
/// Returns false if a global subscriber was already set.
pub fn init_logging(level: &str) -> bool {
    init_logging_with_format(level, LogFormat::Compact)
}

pub fn init_logging_with_format(level: &str, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Compact => builder.compact().finish().try_init().is_ok(),
        LogFormat::Json => builder.json().finish().try_init().is_ok(),
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_keeps_existing_subscriber() {
        let _ = init_logging("debug");
        assert!(!init_logging_with_format("info", LogFormat::Json));
    }
}
