//! Diagnostic logging setup.
//!
//! Library code emits `tracing` events; the binary installs a stderr subscriber so
//! stdout stays reserved for the JSON response envelope. Filtering follows
//! `ASSETLINE_LOG`, then `RUST_LOG`, then the configured default level.

use std::env;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "ASSETLINE_LOG";

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    /// Level for `-v` counts: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            include_target: verbose >= 2,
        }
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let from_env = env::var(LOG_ENV)
        .or_else(|_| env::var("RUST_LOG"))
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok());

    from_env.unwrap_or_else(|| EnvFilter::new(format!("assetline={}", config.level)))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(&config);
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(config.include_target),
            )
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(LoggingConfig::from_verbosity(0).level, Level::WARN);
        assert_eq!(LoggingConfig::from_verbosity(1).level, Level::INFO);
        assert_eq!(LoggingConfig::from_verbosity(2).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_verbosity(9).level, Level::TRACE);
        assert!(LoggingConfig::from_verbosity(2).include_target);
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(LoggingConfig::default());
        init_logging(LoggingConfig::from_verbosity(3));
    }
}
