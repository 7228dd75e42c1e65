//! Logging setup.
//!
//! Library code logs through both `log` and `tracing`. [`init_logging`]
//! installs a `tracing-subscriber` registry and bridges `log` records into it
//! with `tracing_log::LogTracer`, so span context survives on both paths.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::schema::{LogFormat, LoggingConfig};
use crate::error::ConfigError;

/// Builds the filter: `RUST_LOG` when set, else the configured level.
fn build_env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = format!("{},rusqlite=warn", level.trim());
    EnvFilter::try_new(&directives).map_err(|e| {
        ConfigError::validation(format!("Invalid log level '{}': {}", level, e))
    })
}

/// Installs the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed, so repeated
/// calls (tests, embedding applications) are harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = build_env_filter(&config.level)?;

    // Already initialized is fine.
    tracing_log::LogTracer::init().ok();

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter)
            .boxed(),
    };

    Ok(tracing_subscriber::registry().with(layer).try_init().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig::default();
        init_logging(&config).unwrap();
        assert!(!init_logging(&config).unwrap());
    }
}
