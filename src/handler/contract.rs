//! The handler trait.

use super::context::HandlerContext;
use crate::session::{LogEvent, Message, SessionError};
use async_trait::async_trait;

/// Boxed error returned by handler hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for handler hooks.
pub type HandlerResult = Result<(), BoxError>;

/// Application logic bound to one connection.
///
/// The server creates one handler per accepted connection and drops it once
/// the session is closed. Every hook defaults to a no-op, so implementors
/// override only what they need.
///
/// Hooks run inside the session's own task, in frame arrival order. A slow
/// hook stalls its own connection and nothing else. A hook that returns an
/// error ends the session with close status 1011.
///
/// Ping, Pong and Close are answered by the session before the matching
/// `on_*_frame` hook runs; those hooks are for observation only.
///
/// # Example
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use wsgate::handler::{Handler, HandlerContext, HandlerResult};
///
/// #[derive(Default)]
/// struct Echo;
///
/// #[async_trait]
/// impl Handler for Echo {
///     async fn on_text_message(&mut self, ctx: &HandlerContext, text: &str) -> HandlerResult {
///         ctx.session().send_text(text).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send {
    /// Called once the upgrade has completed.
    async fn on_open(&mut self, _ctx: &HandlerContext) -> HandlerResult {
        Ok(())
    }

    /// Called before every message or control frame is dispatched.
    async fn before_dispatch(&mut self, _ctx: &HandlerContext, _message: &Message<'_>) -> HandlerResult {
        Ok(())
    }

    /// A complete text message.
    async fn on_text_message(&mut self, _ctx: &HandlerContext, _text: &str) -> HandlerResult {
        Ok(())
    }

    /// A complete binary message.
    async fn on_binary_message(&mut self, _ctx: &HandlerContext, _data: &[u8]) -> HandlerResult {
        Ok(())
    }

    /// A Close frame arrived and the session has already answered it.
    async fn on_close_frame(&mut self, _ctx: &HandlerContext, _status: Option<u16>) -> HandlerResult {
        Ok(())
    }

    /// A Ping arrived and the session has already sent the Pong.
    async fn on_ping_frame(&mut self, _ctx: &HandlerContext, _payload: &[u8]) -> HandlerResult {
        Ok(())
    }

    /// The Pong for an outstanding ping arrived.
    async fn on_pong_frame(&mut self, _ctx: &HandlerContext, _payload: &[u8]) -> HandlerResult {
        Ok(())
    }

    /// Called after every successful dispatch.
    async fn after_dispatch(&mut self, _ctx: &HandlerContext, _message: &Message<'_>) -> HandlerResult {
        Ok(())
    }

    /// A session log record.
    async fn on_log(&mut self, _ctx: &HandlerContext, _event: &LogEvent) {}

    /// The session hit an error. Called at most once per failure, before teardown.
    async fn on_error(&mut self, _ctx: &HandlerContext, _error: &SessionError) {}
}
