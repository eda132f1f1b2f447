//! Error types and handling for Solarouter
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting. None of these errors
//! is fatal to a router output: callers log them and degrade the affected
//! feature (dimmer disabled, bypass stopped, limiter inactive).

use thiserror::Error;

/// Result type alias for Solarouter operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Main error type for Solarouter
#[derive(Debug, Error)]
pub enum RouterError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Bus communication errors (I2C transaction failures)
    #[error("Bus error: {message}")]
    Bus { message: String },

    /// Device discovery exhausted every attempt without an acknowledgement
    #[error("Discovery error: {message}")]
    Discovery { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

}

impl RouterError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        RouterError::Config {
            message: message.into(),
        }
    }

    /// Create a new bus error
    pub fn bus<S: Into<String>>(message: S) -> Self {
        RouterError::Bus {
            message: message.into(),
        }
    }

    /// Create a new discovery error
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        RouterError::Discovery {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        RouterError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        RouterError::Io {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RouterError {
    fn from(err: std::io::Error) -> Self {
        RouterError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for RouterError {
    fn from(err: serde_yaml::Error) -> Self {
        RouterError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(err: serde_json::Error) -> Self {
        RouterError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for RouterError {
    fn from(err: chrono::ParseError) -> Self {
        RouterError::Validation {
            field: "time".to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RouterError::config("test config error");
        assert!(matches!(err, RouterError::Config { .. }));

        let err = RouterError::bus("test bus error");
        assert!(matches!(err, RouterError::Bus { .. }));

        let err = RouterError::validation("field", "test validation error");
        assert!(matches!(err, RouterError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = RouterError::config("test error");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Configuration error: test error");

        let err = RouterError::validation("test_field", "invalid value");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Validation error: test_field - invalid value");
    }

    #[test]
    fn test_chrono_parse_error_maps_to_validation() {
        let err: RouterError = chrono::NaiveTime::parse_from_str("xx", "%H:%M")
            .unwrap_err()
            .into();
        assert!(matches!(err, RouterError::Validation { .. }));
    }
}
