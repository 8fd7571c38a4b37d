//! Session error types.

use super::state::SessionState;
use crate::frame::{CloseCode, FrameError};
use crate::handler::BoxError;
use crate::handshake::HandshakeError;
use thiserror::Error;

/// Ways a client can break RFC 6455.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Client frames must be masked.
    #[error("client frame is not masked")]
    UnmaskedFrame,

    /// A reserved bit was set without a negotiated extension.
    #[error("reserved bits set without an extension")]
    ReservedBits,

    /// Pong received while no ping was outstanding.
    #[error("unsolicited pong")]
    UnsolicitedPong,

    /// Opcode 3-7 or 11-15.
    #[error("reserved opcode {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame without the fin bit.
    #[error("fragmented control frame")]
    FragmentedControlFrame,

    /// Continuation frame with no message in progress.
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    /// New data frame before the previous message finished.
    #[error("new message started before the previous one finished")]
    InterleavedMessage,

    /// Close status that may not appear on the wire.
    #[error("invalid close status {0}")]
    InvalidCloseStatus(u16),
}

/// Errors raised by a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Frame decode or encode failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Opening handshake failure.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// The peer violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// A reassembled message outgrew its buffer.
    #[error("message exceeds {capacity} bytes")]
    MessageTooLarge {
        /// Reassembly buffer capacity.
        capacity: usize,
    },

    /// A message used more frames than allowed.
    #[error("message exceeds {limit} frames")]
    TooManyFrames {
        /// Configured frame limit.
        limit: usize,
    },

    /// Control frame payload above 125 bytes.
    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlFrameTooLarge(usize),

    /// Text message is not valid UTF-8.
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,

    /// Operation needs a state the session is not in.
    #[error("session is {0}")]
    NotOpen(SessionState),

    /// `run` was called twice.
    #[error("session already started")]
    AlreadyStarted,

    /// The session's cancellation token fired.
    #[error("session cancelled")]
    Cancelled,

    /// A handler hook failed.
    #[error("handler error: {0}")]
    Handler(#[source] BoxError),

    /// Stream write failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Status to send in a Close frame before tearing down, if any.
    ///
    /// Transport failures, timeouts and cancellation return `None`: the
    /// stream is dropped without a Close frame.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Protocol(_) | Self::ControlFrameTooLarge(_) => Some(CloseCode::Protocol),
            Self::MessageTooLarge { .. }
            | Self::TooManyFrames { .. }
            | Self::Frame(FrameError::InsufficientBuffer { .. }) => Some(CloseCode::MessageTooBig),
            Self::InvalidUtf8 => Some(CloseCode::InvalidData),
            Self::Handler(_) => Some(CloseCode::InternalError),
            _ => None,
        }
    }

    /// Whether this error means the peer broke the protocol.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        self.close_code().is_some_and(|code| code != CloseCode::InternalError)
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
