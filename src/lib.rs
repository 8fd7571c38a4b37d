//! # wsgate
//!
//! A server-side RFC 6455 WebSocket implementation. Each accepted connection
//! is upgraded, then its frames are reassembled into messages and handed to
//! an application [`Handler`](handler::Handler) bound to that connection.
//!
//! ## Layers
//!
//! - [`frame`]: wire codec for a single frame
//! - [`handshake`]: HTTP/1.1 upgrade request parsing and responses
//! - [`session`]: per-connection state machine (handshake, read loop,
//!   ping/pong, two-phase close)
//! - [`handler`]: the application extension point
//! - [`server`]: TCP listener, optional TLS, concurrency limit, registry
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use wsgate::config::ServerConfig;
//! use wsgate::handler::{Handler, HandlerContext, HandlerResult};
//! use wsgate::server::Listener;
//!
//! #[derive(Default)]
//! struct Echo;
//!
//! #[async_trait]
//! impl Handler for Echo {
//!     async fn on_text_message(&mut self, ctx: &HandlerContext, text: &str) -> HandlerResult {
//!         ctx.session().send_text(text).await?;
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = Listener::bind(ServerConfig::default()).await?;
//! listener.serve::<Echo>(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod keys;
pub mod pool;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use handler::{Handler, HandlerContext};
pub use server::{Listener, ServerHandle};
pub use session::{Session, SessionState};
