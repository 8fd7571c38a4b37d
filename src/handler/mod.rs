//! # Handler Abstraction
//!
//! The application's extension point. A [`Handler`] receives complete
//! messages from one session and may answer through the session bound to its
//! [`HandlerContext`].

mod context;
mod contract;
mod services;

pub use context::HandlerContext;
pub use contract::{BoxError, Handler, HandlerResult};
pub use services::Services;
