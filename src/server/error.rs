//! Server error types.

use crate::config::ConfigError;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while loading a TLS identity.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Failed to load certificate.
    #[error("failed to load certificate from '{path}': {message}")]
    CertificateLoadError {
        /// The certificate path.
        path: String,
        /// Error message.
        message: String,
    },

    /// Failed to load private key.
    #[error("failed to load private key from '{path}': {message}")]
    PrivateKeyLoadError {
        /// The private key path.
        path: String,
        /// Error message.
        message: String,
    },

    /// rustls rejected the certificate/key pair.
    #[error("invalid TLS identity: {0}")]
    InvalidIdentity(#[from] tokio_rustls::rustls::Error),
}

/// Result type for TLS operations.
pub type TlsResult<T> = Result<T, TlsError>;

/// Errors that stop a listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {address}: {source}")]
    BindError {
        /// The address that failed to bind.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The accept loop hit an unrecoverable error.
    #[error("failed to accept connection: {0}")]
    AcceptError(#[source] std::io::Error),

    /// TLS identity error.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Request patterns failed to compile.
    #[error("invalid request pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = ServerError::BindError {
            address: "127.0.0.1:80".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind to 127.0.0.1:80: denied");
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = ServerError::from(ConfigError::ValidationError("max_connections".into()));
        assert_eq!(
            err.to_string(),
            "configuration validation failed: max_connections"
        );
    }
}
