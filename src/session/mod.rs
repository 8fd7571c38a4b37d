//! # Connection Session
//!
//! One accepted stream and its protocol state: the opening handshake, frame
//! reassembly, the ping/pong and close state machine, and teardown.
//!
//! ## Lifecycle
//!
//! ```text
//! AwaitingHandshake ──101──▶ Open ──Close──▶ Closing ──Close──▶ Closed
//!         │                                                       ▲
//!         └──────────────── 400 / timeout ────────────────────────┘
//! ```
//!
//! A session is driven by [`Session::run`] inside its connection task and
//! reports to exactly one [`Handler`](crate::handler::Handler).

mod connection;
mod error;
mod events;
mod state;

pub use connection::Session;
pub use error::{ProtocolViolation, SessionError, SessionResult};
pub use events::{LogEvent, Message};
pub use state::SessionState;

use crate::config::ServerConfig;
use crate::handshake::RequestParser;
use crate::keys::KeyGenerator;
use crate::pool::BufferPool;
use crate::server::ServerStats;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A byte stream a session can run over: plain TCP, TLS, or an in-memory
/// pipe in tests.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased transport.
pub type BoxedStream = Box<dyn Transport>;

/// Server-wide utilities every session borrows.
#[derive(Debug, Clone)]
pub struct SessionShared {
    /// Immutable server configuration.
    pub config: Arc<ServerConfig>,
    /// Compiled request patterns.
    pub parser: Arc<RequestParser>,
    /// Frame and reassembly buffers.
    pub pool: Arc<BufferPool>,
    /// Random key material.
    pub keys: Arc<KeyGenerator>,
    /// Server counters.
    pub stats: Arc<ServerStats>,
}
