//! # Server
//!
//! The listener, the session registry, and the state every session shares.
//!
//! ```text
//! TcpListener ──accept──▶ [permit] ──▶ TLS? ──▶ Session::run ──▶ Handler
//!                             │                       │
//!                        Semaphore               ServerHandle
//!                     (max_connections)   (registry, stats, shutdown)
//! ```

mod error;
mod handle;
mod listener;
mod registry;
mod stats;
mod tls;

pub use error::{ServerError, ServerResult, TlsError, TlsResult};
pub use handle::ServerHandle;
pub use listener::Listener;
pub use stats::{ServerStats, StatsSnapshot};
pub use tls::TlsIdentity;
