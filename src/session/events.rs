//! Values a session hands to its handler.

use crate::frame::OpCode;
use tracing::Level;
use uuid::Uuid;

/// One complete message, or one control frame.
///
/// The payload borrows the session's reassembly buffer and is only valid for
/// the duration of the dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    /// Opcode of the message's first frame.
    pub opcode: OpCode,
    /// Close status, for close frames that carry one.
    pub close_status: Option<u16>,
    /// Message bytes.
    pub payload: &'a [u8],
}

impl<'a> Message<'a> {
    /// Create a message without a close status.
    #[must_use]
    pub fn new(opcode: OpCode, payload: &'a [u8]) -> Self {
        Self {
            opcode,
            close_status: None,
            payload,
        }
    }
}

/// A log record emitted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Session that produced the record.
    pub session: Uuid,
    /// Severity.
    pub level: Level,
    /// Human-readable text.
    pub message: String,
}

impl LogEvent {
    pub(crate) fn new(session: Uuid, level: Level, message: impl Into<String>) -> Self {
        Self {
            session,
            level,
            message: message.into(),
        }
    }
}
