//! Core error types for Lantern.
//!
//! [`LanternError`] covers invalid routes, [`ConfigError`] covers loading and
//! validating the config file.

use thiserror::Error;

/// Errors from building routes.
#[derive(Error, Debug)]
pub enum LanternError {
    /// Route errors (invalid path, invalid definition)
    #[error("route error: {0}")]
    Route(String),

    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Config file not found
    #[error("config file not found at {path}")]
    NotFound {
        /// Path where config was expected
        path: String,
    },

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LanternError::Route("empty path".to_string());
        assert_eq!(err.to_string(), "route error: empty path");

        let err = ConfigError::InvalidValue {
            field: "scanner.max_workers".to_string(),
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value for scanner.max_workers: must be at least 1"
        );
    }

    #[test]
    fn test_config_error_from_toml() {
        let parse_err = toml::from_str::<toml::Table>("site = ").unwrap_err();
        let err: ConfigError = parse_err.into();
        assert!(matches!(err, ConfigError::ParseError(_)));
        assert!(err.to_string().starts_with("failed to parse config TOML"));
    }
}
