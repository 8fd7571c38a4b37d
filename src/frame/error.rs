//! Frame codec error types.

use thiserror::Error;

/// Errors produced while decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream or stopped sending mid-frame.
    #[error("connection timed out while reading frame")]
    ConnectionTimedOut,

    /// The frame does not fit the supplied buffer.
    #[error("frame of {required} bytes exceeds buffer capacity of {capacity} bytes")]
    InsufficientBuffer {
        /// Bytes the frame needs (header plus payload).
        required: u64,
        /// Bytes available in the buffer.
        capacity: usize,
    },

    /// Underlying stream failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Map a read error, treating a truncated stream as a timeout.
    pub(crate) fn from_read(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::ConnectionTimedOut
        } else {
            Self::Io(error)
        }
    }
}

/// Result type for frame operations.
pub type FrameResult<T> = Result<T, FrameError>;
