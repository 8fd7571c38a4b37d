//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Root server configuration.
///
/// Immutable once the listener is constructed; shared between sessions as
/// an `Arc<ServerConfig>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Advertised host/origin prefix, joined with the requested resource to
    /// build the handshake URL (e.g. `ws://chat.example.com`).
    pub host: Option<String>,

    /// Whether an `Origin` header is mandatory in the upgrade request.
    pub require_origin: bool,

    /// How long a client has to send a complete upgrade request.
    #[serde(with = "humantime_serde")]
    pub upgrade_timeout: Duration,

    /// Sub-protocols the server is willing to speak, in preference order.
    pub protocols: Vec<String>,

    /// Size of the per-connection frame buffer; also the largest payload
    /// chunk written in a single outgoing frame.
    pub buffer_size: usize,

    /// Maximum number of frames a client may use for one message.
    pub max_frame_count: usize,

    /// Largest accepted upgrade request, in bytes.
    pub max_handshake_size: usize,

    /// Maximum number of concurrently accepted connections.
    pub max_connections: usize,

    /// Socket settings.
    pub listener: ListenerConfig,

    /// Certificate files for the launcher. The library itself only consumes
    /// an already loaded identity.
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            require_origin: false,
            upgrade_timeout: Duration::from_secs(10),
            protocols: Vec::new(),
            buffer_size: 4096,
            max_frame_count: 1,
            max_handshake_size: 8192,
            max_connections: 1024,
            listener: ListenerConfig::default(),
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Capacity of the message reassembly buffer.
    ///
    /// A message whose frames add up to more than this is rejected.
    #[must_use]
    pub fn message_capacity(&self) -> usize {
        self.buffer_size.saturating_mul(self.max_frame_count)
    }

    /// Set the advertised host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the frame buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the maximum number of frames per message.
    #[must_use]
    pub fn with_max_frame_count(mut self, max_frame_count: usize) -> Self {
        self.max_frame_count = max_frame_count;
        self
    }

    /// Set the upgrade timeout.
    #[must_use]
    pub fn with_upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrent connections.
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the supported sub-protocols.
    #[must_use]
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Require an `Origin` header on upgrade requests.
    #[must_use]
    pub fn with_require_origin(mut self, require: bool) -> Self {
        self.require_origin = require;
        self
    }

    /// Set the listen address and port.
    #[must_use]
    pub fn with_listen(mut self, address: IpAddr, port: u16) -> Self {
        self.listener.address = address;
        self.listener.port = port;
        self
    }
}

/// Listening socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address.
    pub address: IpAddr,

    /// Bind port (0 picks an ephemeral port).
    pub port: u16,

    /// Whether to disable Nagle's algorithm on accepted sockets.
    pub tcp_nodelay: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            tcp_nodelay: true,
        }
    }
}

impl ListenerConfig {
    /// Get the socket address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// PEM file locations for the server identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsConfig {
    /// Certificate chain (leaf first).
    pub cert_path: PathBuf,

    /// Private key.
    pub key_path: PathBuf,
}
