//! Logging setup using `tracing-subscriber`.
//!
//! `RUST_LOG` takes precedence over the configured level. Logs go to stderr so that
//! reports written to stdout stay machine-readable.

use crate::config::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),
    #[error("Failed to install logger: {0}")]
    Install(String),
}

/// Filter from `RUST_LOG`, falling back to `level`.
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| LoggerError::InvalidFilter(level.to_string(), e.to_string())),
    }
}

pub fn setup_logging(config: &LoggingConfig) -> Result<(), LoggerError> {
    let filter = env_filter(&config.level)?;
    let format_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(format_layer.json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(format_layer.compact())
            .try_init(),
    };
    installed.map_err(|e| LoggerError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(matches!(
            env_filter("dhis_analytics_core=verbose"),
            Err(LoggerError::InvalidFilter(..))
        ));
    }

    #[test]
    fn test_module_directives_are_accepted() {
        assert!(env_filter("warn,dhis_analytics_core=debug").is_ok());
    }
}
