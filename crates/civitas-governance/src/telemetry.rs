//! Logging initialization.
//!
//! Sets up structured logging with tracing and optional JSON output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install a global subscriber filtered by `log_level`.
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_telemetry(log_level: &str, json_format: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(log_level)?;

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

/// Initialize logging from the `[logging]` config section.
pub fn init_from_config(config: &LoggingConfig) -> anyhow::Result<()> {
    init_telemetry(&config.level, config.is_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(init_telemetry("civitas=loud", false).is_err());
    }

    #[test]
    fn test_second_init_fails_instead_of_panicking() {
        let _ = init_telemetry("debug", false);
        assert!(init_from_config(&LoggingConfig::default()).is_err());
    }
}
