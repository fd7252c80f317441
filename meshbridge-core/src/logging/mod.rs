//! Logging subsystem for the bridge
//!
//! Thin setup layer over `tracing-subscriber`. Components log through the
//! `tracing` macros with structured fields (`identity`, `channel`, `instance`);
//! this module only decides how those records are filtered and formatted.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// The minimum log level to display when `RUST_LOG` is unset
    pub level: LogLevel,
    /// Whether to include timestamps
    pub with_timestamp: bool,
    /// Whether to include target module information
    pub with_target: bool,
    /// Whether to use JSON formatting
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig with specified level
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set whether to include timestamps
    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    /// Set whether to include target information
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Set whether to use JSON formatting
    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }
}

/// Initialize the logging subsystem with default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize the logging subsystem with custom configuration
///
/// `RUST_LOG` takes precedence over `config.level` when it is set.
///
/// # Example
/// ```
/// use meshbridge_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(config.with_target);

    let result = match (config.json_format, config.with_timestamp) {
        (true, true) => builder.json().try_init(),
        (true, false) => builder.json().without_time().try_init(),
        (false, true) => builder.try_init(),
        (false, false) => builder.without_time().try_init(),
    };

    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.with_timestamp);
        assert!(config.with_target);
        assert!(!config.json_format);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new(LogLevel::Debug)
            .with_timestamp(false)
            .with_target(false)
            .json_format(true);

        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.with_timestamp);
        assert!(!config.with_target);
        assert!(config.json_format);
    }

    #[test]
    fn test_second_init_is_rejected() {
        // Only one global subscriber may exist per process; whichever call
        // wins, the other must report InitializationFailed instead of panicking.
        let first = init_logging_with_config(LogConfig::new(LogLevel::Warn).with_timestamp(false));
        let second = init_logging();
        assert!(first.is_err() || second.is_err());
        if let Err(err) = second {
            assert!(matches!(err, LoggingError::InitializationFailed(_)));
        }
    }
}
