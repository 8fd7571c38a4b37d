//! Configuration validation.

use super::types::ServerConfig;
use crate::frame::MAX_CONTROL_PAYLOAD;

/// Smallest upgrade request buffer worth accepting.
const MIN_HANDSHAKE_SIZE: usize = 16;

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: &'static str,
    /// Error message.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for values the server cannot run with.
///
/// Returns every problem found rather than stopping at the first.
#[must_use]
pub fn validate(config: &ServerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // A control frame is never fragmented, so it has to fit one frame.
    if config.buffer_size < MAX_CONTROL_PAYLOAD {
        errors.push(ValidationError::new(
            "buffer_size",
            format!(
                "must be at least {MAX_CONTROL_PAYLOAD} bytes, got {}",
                config.buffer_size
            ),
        ));
    }

    if config.max_frame_count == 0 {
        errors.push(ValidationError::new(
            "max_frame_count",
            "must allow at least one frame per message",
        ));
    }

    if config.max_connections == 0 {
        errors.push(ValidationError::new(
            "max_connections",
            "must allow at least one connection",
        ));
    } else if config.max_connections > tokio::sync::Semaphore::MAX_PERMITS {
        errors.push(ValidationError::new(
            "max_connections",
            format!("must not exceed {}", tokio::sync::Semaphore::MAX_PERMITS),
        ));
    }

    if config.max_handshake_size < MIN_HANDSHAKE_SIZE {
        errors.push(ValidationError::new(
            "max_handshake_size",
            format!("must be at least {MIN_HANDSHAKE_SIZE} bytes"),
        ));
    }

    if config.upgrade_timeout.is_zero() {
        errors.push(ValidationError::new(
            "upgrade_timeout",
            "must be greater than zero",
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&ServerConfig::default()).is_empty());
    }

    #[test]
    fn test_small_buffer_rejected() {
        let config = ServerConfig::default().with_buffer_size(64);
        let errors = validate(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "buffer_size");
    }

    #[test]
    fn test_collects_all_errors() {
        let config = ServerConfig::default()
            .with_max_frame_count(0)
            .with_max_connections(0)
            .with_upgrade_timeout(Duration::ZERO);
        let fields: Vec<_> = validate(&config).iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["max_frame_count", "max_connections", "upgrade_timeout"]
        );
    }

    #[test]
    fn test_error_display() {
        let error = ValidationError::new("buffer_size", "too small");
        assert_eq!(error.to_string(), "buffer_size: too small");
    }
}
