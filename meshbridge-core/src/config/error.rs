//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read configuration file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write configuration file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML did not match the `Config` layout
    #[error("Failed to parse configuration")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration")]
    Serialize(#[from] toml::ser::Error),

    /// An environment override or enum value could not be parsed
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The values parsed but do not describe a runnable bridge
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_read_error_names_path_and_keeps_cause() {
        let err = ConfigError::Read {
            path: PathBuf::from("/etc/meshbridge.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to read configuration file /etc/meshbridge.toml"
        );
        assert_eq!(err.source().map(|s| s.to_string()), Some("gone".to_string()));
    }

    #[test]
    fn test_parse_error_keeps_toml_cause() {
        let toml_err = toml::from_str::<toml::Value>("[mediator").unwrap_err();
        let err: ConfigError = toml_err.into();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.source().is_some());
    }
}
