//! # Configuration
//!
//! TOML-based server configuration with validation.
//!
//! ## Example Configuration
//!
//! ```toml
//! host = "ws://chat.example.com"
//! require_origin = false
//! upgrade_timeout = "10s"
//! protocols = ["chat.v1"]
//! buffer_size = 4096
//! max_frame_count = 4
//! max_connections = 1024
//!
//! [listener]
//! address = "0.0.0.0"
//! port = 8080
//!
//! [tls]
//! cert_path = "/etc/wsgate/cert.pem"
//! key_path = "/etc/wsgate/key.pem"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{ListenerConfig, ServerConfig, TlsConfig};
pub use validation::{validate, ValidationError};
