//! Configuration management for the bridge
//!
//! Defaults, TOML files and `MESHBRIDGE_*` environment overrides all produce the
//! same [`Config`], which is validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::logging::{LogConfig, LogLevel};

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long the mediator task gets to stop before it is aborted
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Mediator behaviour
    pub mediator: MediatorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// What happens to a channel mapping when its peer goes out of range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LostPeerPolicy {
    /// Keep the channel so a returning peer is re-bridged to it without
    /// provisioning. Chat messages for the identity are dropped meanwhile.
    #[default]
    RetainChannel,
    /// Forget the whole entry, including any outstanding provisioning.
    TearDown,
}

impl LostPeerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LostPeerPolicy::RetainChannel => "retain_channel",
            LostPeerPolicy::TearDown => "tear_down",
        }
    }
}

impl fmt::Display for LostPeerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LostPeerPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "retain_channel" | "retain" => Ok(LostPeerPolicy::RetainChannel),
            "tear_down" | "teardown" => Ok(LostPeerPolicy::TearDown),
            other => Err(ConfigError::InvalidValue(format!(
                "Invalid lost peer policy: {}",
                other
            ))),
        }
    }
}

/// Mediator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Chat identity of the bridging device itself, used for text typed
    /// locally by the presentation layer
    pub local_identity: String,

    /// Display name requested when provisioning the local channel
    pub display_name: String,

    /// Channel policy for peers that go out of range
    pub lost_peer_policy: LostPeerPolicy,

    /// Fail provisioning requests that get no answer within this bound.
    /// Unset means an identity may stay provisioning indefinitely.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub provisioning_timeout: Option<Duration>,

    /// How often outstanding provisioning requests are checked
    #[serde(with = "humantime_serde")]
    pub watchdog_interval: Duration,

    /// Capacity of the mediator command queue
    pub command_buffer: usize,

    /// Capacity of each collaborator event stream
    pub event_buffer: usize,

    /// Number of notifications buffered per presentation subscriber
    pub notification_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Register metric descriptions at startup
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
            mediator: MediatorConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            local_identity: "meshbridge-local".to_string(),
            display_name: "Mesh Bridge".to_string(),
            lost_peer_policy: LostPeerPolicy::RetainChannel,
            provisioning_timeout: None,
            watchdog_interval: Duration::from_secs(1),
            command_buffer: 256,
            event_buffer: 128,
            notification_capacity: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl MediatorConfig {
    /// Check the values the mediator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_identity.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "local_identity must not be empty".to_string(),
            ));
        }

        if self.command_buffer == 0 || self.event_buffer == 0 || self.notification_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "command_buffer, event_buffer and notification_capacity must be greater than 0"
                    .to_string(),
            ));
        }

        if let Some(timeout) = self.provisioning_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::ValidationFailed(
                    "provisioning_timeout must be greater than 0".to_string(),
                ));
            }
            if self.watchdog_interval.is_zero() {
                return Err(ConfigError::ValidationFailed(
                    "watchdog_interval must be greater than 0 when provisioning_timeout is set"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl LoggingConfig {
    /// Build the logging subsystem's settings from this section
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = LogLevel::parse(&self.level)
            .ok_or_else(|| ConfigError::InvalidValue(format!("Invalid log level: {}", self.level)))?;

        Ok(LogConfig::new(level)
            .with_timestamp(self.with_timestamp)
            .with_target(self.with_target)
            .json_format(self.json_format))
    }
}

fn parse_flag(value: &str, what: &str) -> Result<bool, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e)))
}

fn parse_count(value: &str, what: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e)))
}

fn parse_duration(value: &str, what: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(value.trim())
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e)))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: MESHBRIDGE_<SECTION>_<KEY>
    /// Example: MESHBRIDGE_MEDIATOR_LOST_PEER_POLICY=tear_down
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Apply `MESHBRIDGE_*` overrides from `lookup` on top of `self`
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Mediator config
        if let Some(identity) = lookup("MESHBRIDGE_MEDIATOR_LOCAL_IDENTITY") {
            self.mediator.local_identity = identity;
        }
        if let Some(name) = lookup("MESHBRIDGE_MEDIATOR_DISPLAY_NAME") {
            self.mediator.display_name = name;
        }
        if let Some(policy) = lookup("MESHBRIDGE_MEDIATOR_LOST_PEER_POLICY") {
            self.mediator.lost_peer_policy = policy.parse()?;
        }
        if let Some(timeout) = lookup("MESHBRIDGE_MEDIATOR_PROVISIONING_TIMEOUT") {
            self.mediator.provisioning_timeout = match timeout.trim() {
                "" | "none" | "off" => None,
                value => Some(parse_duration(value, "provisioning timeout")?),
            };
        }
        if let Some(interval) = lookup("MESHBRIDGE_MEDIATOR_WATCHDOG_INTERVAL") {
            self.mediator.watchdog_interval = parse_duration(&interval, "watchdog interval")?;
        }
        if let Some(buffer) = lookup("MESHBRIDGE_MEDIATOR_COMMAND_BUFFER") {
            self.mediator.command_buffer = parse_count(&buffer, "command buffer")?;
        }

        // Logging config
        if let Some(level) = lookup("MESHBRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("MESHBRIDGE_LOG_JSON") {
            self.logging.json_format = parse_flag(&json, "JSON flag")?;
        }

        // Metrics config
        if let Some(enabled) = lookup("MESHBRIDGE_METRICS_ENABLED") {
            self.metrics.enabled = parse_flag(&enabled, "metrics flag")?;
        }

        if let Some(timeout) = lookup("MESHBRIDGE_SHUTDOWN_TIMEOUT") {
            self.shutdown_timeout = parse_duration(&timeout, "shutdown timeout")?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mediator.validate()?;

        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Render configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mediator.lost_peer_policy, LostPeerPolicy::RetainChannel);
        assert!(config.mediator.provisioning_timeout.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.mediator.local_identity = "  ".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.mediator.command_buffer = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.mediator.provisioning_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        config = Config::default();
        config.mediator.provisioning_timeout = Some(Duration::from_secs(10));
        config.mediator.watchdog_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        // the interval only matters while the watchdog is armed
        config.mediator.provisioning_timeout = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(lookup_from(&[
                ("MESHBRIDGE_MEDIATOR_LOCAL_IDENTITY", "ipad-7"),
                ("MESHBRIDGE_MEDIATOR_LOST_PEER_POLICY", "tear-down"),
                ("MESHBRIDGE_MEDIATOR_PROVISIONING_TIMEOUT", "30s"),
                ("MESHBRIDGE_LOG_LEVEL", "debug"),
                ("MESHBRIDGE_METRICS_ENABLED", "false"),
            ]))
            .unwrap();

        assert_eq!(config.mediator.local_identity, "ipad-7");
        assert_eq!(config.mediator.lost_peer_policy, LostPeerPolicy::TearDown);
        assert_eq!(
            config.mediator.provisioning_timeout,
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.logging.level, "debug");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let result = Config::default()
            .with_overrides(lookup_from(&[("MESHBRIDGE_MEDIATOR_LOST_PEER_POLICY", "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));

        let result = Config::default()
            .with_overrides(lookup_from(&[("MESHBRIDGE_LOG_JSON", "yes please")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));

        let result = Config::default()
            .with_overrides(lookup_from(&[("MESHBRIDGE_MEDIATOR_PROVISIONING_TIMEOUT", "soon")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshbridge.toml");

        let mut config = Config::default();
        config.mediator.lost_peer_policy = LostPeerPolicy::TearDown;
        config.mediator.provisioning_timeout = Some(Duration::from_secs(45));
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[mediator]\nlocal_identity = \"kiosk\"\nprovisioning_timeout = \"2m\"\n",
        )
        .unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.mediator.local_identity, "kiosk");
        assert_eq!(
            loaded.mediator.provisioning_timeout,
            Some(Duration::from_secs(120))
        );
        assert_eq!(loaded.logging, LoggingConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/definitely/not/here/meshbridge.toml");
        match result {
            Err(ConfigError::Read { path, .. }) => {
                assert_eq!(path, Path::new("/definitely/not/here/meshbridge.toml"));
            }
            other => panic!("expected read error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let result = Config::from_toml("[mediator]\ncommand_buffer = \"lots\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_logging_section_conversion() {
        let mut logging = LoggingConfig::default();
        logging.level = "warn".to_string();
        logging.json_format = true;

        let log_config = logging.to_log_config().unwrap();
        assert_eq!(log_config.level, LogLevel::Warn);
        assert!(log_config.json_format);
    }
}
