//! Handshake error types.

use thiserror::Error;

/// Errors that end an upgrade attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The client did not finish its request in time, or closed the stream.
    #[error("handshake timed out")]
    TimedOut,

    /// The request is not a well-formed GET request.
    #[error("malformed upgrade request: {0}")]
    MalformedRequest(String),

    /// The request headers do not fit the handshake buffer.
    #[error("upgrade request exceeds {limit} bytes")]
    RequestTooLarge {
        /// Configured size limit.
        limit: usize,
    },

    /// The request parsed but fails the upgrade checks.
    #[error("invalid upgrade request: {0}")]
    InvalidUpgrade(String),

    /// Underlying stream failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HandshakeError {
    /// Whether the client should be told with a `400 Bad Request`.
    ///
    /// Timeouts and broken streams get no response.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest(_) | Self::RequestTooLarge { .. } | Self::InvalidUpgrade(_)
        )
    }
}

/// Result type for handshake operations.
pub type HandshakeResult<T> = Result<T, HandshakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(HandshakeError::MalformedRequest("x".into()).is_client_error());
        assert!(HandshakeError::RequestTooLarge { limit: 16 }.is_client_error());
        assert!(HandshakeError::InvalidUpgrade("x".into()).is_client_error());
        assert!(!HandshakeError::TimedOut.is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = HandshakeError::RequestTooLarge { limit: 8192 };
        assert_eq!(err.to_string(), "upgrade request exceeds 8192 bytes");
    }
}
