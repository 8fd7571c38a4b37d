//! # Frame Codec
//!
//! Decoding and encoding of RFC 6455 frames, in place on caller-owned
//! buffers.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! The codec never owns the stream or the buffer. Sessions rent buffers from
//! the [`BufferPool`](crate::pool::BufferPool) and hand them in.

mod codec;
mod error;
mod opcode;

pub use codec::{
    apply_mask, header_len, read_frame, write_frame, Frame, MAX_CONTROL_PAYLOAD, MAX_HEADER_LEN,
};
pub use error::{FrameError, FrameResult};
pub use opcode::{CloseCode, OpCode};
