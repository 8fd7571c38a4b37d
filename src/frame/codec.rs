//! In-place frame decoding and encoding.

use super::error::{FrameError, FrameResult};
use super::opcode::{CloseCode, OpCode};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest possible frame header: 2 fixed bytes, 8 length bytes, 4 key bytes.
pub const MAX_HEADER_LEN: usize = 14;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// A decoded frame.
///
/// The payload borrows the buffer passed to [`read_frame`]; it is already
/// unmasked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Final fragment of a message.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Whether the frame arrived with a masking key.
    pub masked: bool,
    /// Close status, present only for close frames with at least two payload bytes.
    pub close_status: Option<u16>,
    /// Unmasked payload bytes.
    pub payload: &'a [u8],
}

impl Frame<'_> {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether any reserved bit is set.
    #[must_use]
    pub fn has_reserved_bits(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }

    /// Close status as a [`CloseCode`].
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        self.close_status.map(CloseCode::from)
    }
}

/// Size of the header needed for a payload of `payload_len` bytes.
#[must_use]
pub const fn header_len(payload_len: usize, masked: bool) -> usize {
    let base = if payload_len < 126 {
        2
    } else if payload_len <= u16::MAX as usize {
        4
    } else {
        10
    };
    if masked {
        base + 4
    } else {
        base
    }
}

/// XOR `payload` with `key`, starting at key position `offset`.
///
/// Applying the same key twice restores the input.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4], offset: usize) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[(offset + i) & 3];
    }
}

async fn fill<R>(reader: &mut R, dst: &mut [u8]) -> FrameResult<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    reader
        .read_exact(dst)
        .await
        .map(|_| ())
        .map_err(FrameError::from_read)
}

/// Read one frame from `reader` into `buf`.
///
/// The raw header is copied to the front of `buf` and the payload is read
/// directly after it, so `buf` must hold header and payload together. The
/// length check happens before any payload byte is consumed.
///
/// # Errors
///
/// - [`FrameError::ConnectionTimedOut`] if the stream ends before the frame does
/// - [`FrameError::InsufficientBuffer`] if the frame does not fit `buf`
/// - [`FrameError::Io`] on any other read failure
pub async fn read_frame<'a, R>(reader: &mut R, buf: &'a mut [u8]) -> FrameResult<Frame<'a>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; MAX_HEADER_LEN];
    fill(reader, &mut header[..2]).await?;

    let first = header[0];
    let second = header[1];
    let masked = second & 0x80 != 0;

    let mut consumed = 2;
    let len = match second & 0x7F {
        126 => {
            fill(reader, &mut header[2..4]).await?;
            consumed = 4;
            u64::from(u16::from_be_bytes([header[2], header[3]]))
        },
        127 => {
            fill(reader, &mut header[2..10]).await?;
            consumed = 10;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&header[2..10]);
            u64::from_be_bytes(raw)
        },
        short => u64::from(short),
    };

    let key = if masked {
        fill(reader, &mut header[consumed..consumed + 4]).await?;
        let key = [
            header[consumed],
            header[consumed + 1],
            header[consumed + 2],
            header[consumed + 3],
        ];
        consumed += 4;
        Some(key)
    } else {
        None
    };

    let capacity = buf.len();
    let required = len.saturating_add(consumed as u64);
    if required > capacity as u64 {
        return Err(FrameError::InsufficientBuffer { required, capacity });
    }
    // bounded by capacity above
    let len = len as usize;

    let (head, rest) = buf.split_at_mut(consumed);
    head.copy_from_slice(&header[..consumed]);
    let payload = &mut rest[..len];

    if len > 0 {
        fill(reader, payload).await?;
        if let Some(key) = key {
            apply_mask(payload, key, 0);
        }
    }

    let opcode = OpCode::from(first);
    let close_status = if opcode == OpCode::Close && payload.len() >= 2 {
        Some(u16::from_be_bytes([payload[0], payload[1]]))
    } else {
        None
    };

    Ok(Frame {
        fin: first & 0x80 != 0,
        rsv1: first & 0x40 != 0,
        rsv2: first & 0x20 != 0,
        rsv3: first & 0x10 != 0,
        opcode,
        masked,
        close_status,
        payload,
    })
}

/// Serialize one frame into `buf`, returning the number of bytes written.
///
/// When `mask` is given the mask bit is set and the payload is XORed with
/// the key as it is copied. Reserved bits are always written as zero.
///
/// # Errors
///
/// Returns [`FrameError::InsufficientBuffer`] if `buf` is too small.
pub fn write_frame(
    buf: &mut [u8],
    fin: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    payload: Option<&[u8]>,
) -> FrameResult<usize> {
    let payload = payload.unwrap_or(&[]);
    let len = payload.len();
    let start = header_len(len, false);
    let total = header_len(len, mask.is_some()) + len;

    if total > buf.len() {
        return Err(FrameError::InsufficientBuffer {
            required: total as u64,
            capacity: buf.len(),
        });
    }

    buf[0] = (u8::from(fin) << 7) | u8::from(opcode);
    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };

    match start {
        2 => buf[1] = mask_bit | len as u8,
        4 => {
            buf[1] = mask_bit | 126;
            buf[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        },
        _ => {
            buf[1] = mask_bit | 127;
            buf[2..10].copy_from_slice(&(len as u64).to_be_bytes());
        },
    }

    let mut pos = start;
    if let Some(key) = mask {
        buf[pos..pos + 4].copy_from_slice(&key);
        pos += 4;
    }

    let body = &mut buf[pos..total];
    body.copy_from_slice(payload);
    if let Some(key) = mask {
        apply_mask(body, key, 0);
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn encode(fin: bool, opcode: OpCode, mask: Option<[u8; 4]>, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; payload.len() + MAX_HEADER_LEN];
        let n = write_frame(&mut buf, fin, opcode, mask, Some(payload)).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_apply_mask_is_involution() {
        let original = b"the quick brown fox".to_vec();
        let mut data = original.clone();
        apply_mask(&mut data, KEY, 0);
        assert_ne!(data, original);
        apply_mask(&mut data, KEY, 0);
        assert_eq!(data, original);
    }

    #[test]
    fn test_apply_mask_offset() {
        let mut whole = vec![0u8; 10];
        apply_mask(&mut whole, KEY, 0);

        let mut split = vec![0u8; 10];
        let (a, b) = split.split_at_mut(3);
        apply_mask(a, KEY, 0);
        apply_mask(b, KEY, 3);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_header_len() {
        assert_eq!(header_len(0, false), 2);
        assert_eq!(header_len(125, true), 6);
        assert_eq!(header_len(126, false), 4);
        assert_eq!(header_len(65535, false), 4);
        assert_eq!(header_len(65536, true), 14);
    }

    #[test]
    fn test_write_rfc_examples() {
        // RFC 6455 section 5.7
        assert_eq!(
            encode(true, OpCode::Text, None, b"Hello"),
            vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]
        );
        assert_eq!(
            encode(true, OpCode::Text, Some([0x37, 0xfa, 0x21, 0x3d]), b"Hello"),
            vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
        assert_eq!(
            encode(false, OpCode::Text, None, b"Hel"),
            vec![0x01, 0x03, 0x48, 0x65, 0x6c]
        );
    }

    #[test]
    fn test_write_extended_lengths() {
        let frame = encode(true, OpCode::Binary, None, &[0u8; 256]);
        assert_eq!(&frame[..4], &[0x82, 0x7E, 0x01, 0x00]);

        let frame = encode(true, OpCode::Binary, None, &[0u8; 65536]);
        assert_eq!(
            &frame[..10],
            &[0x82, 0x7F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_write_insufficient_buffer() {
        let mut buf = [0u8; 8];
        let result = write_frame(&mut buf, true, OpCode::Text, None, Some(b"too long"));
        assert!(matches!(
            result,
            Err(FrameError::InsufficientBuffer {
                required: 10,
                capacity: 8
            })
        ));
    }

    #[test]
    fn test_write_empty_payload() {
        let mut buf = [0u8; 2];
        let n = write_frame(&mut buf, true, OpCode::Pong, None, None).unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf, [0x8A, 0x00]);
    }

    #[tokio::test]
    async fn test_round_trip_boundary_sizes() {
        for size in [0usize, 1, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let wire = encode(true, OpCode::Binary, Some(KEY), &payload);

            let mut buf = vec![0u8; size + MAX_HEADER_LEN];
            let frame = read_frame(&mut wire.as_slice(), &mut buf).await.unwrap();
            assert!(frame.fin, "size {size}");
            assert!(frame.masked);
            assert_eq!(frame.opcode, OpCode::Binary);
            assert_eq!(frame.payload, payload.as_slice(), "size {size}");
        }
    }

    #[tokio::test]
    async fn test_read_flags() {
        let wire = [0x71u8, 0x00];
        let mut buf = [0u8; 16];
        let frame = read_frame(&mut &wire[..], &mut buf).await.unwrap();
        assert!(!frame.fin);
        assert!(frame.rsv1 && frame.rsv2 && frame.rsv3);
        assert!(frame.has_reserved_bits());
        assert_eq!(frame.opcode, OpCode::Text);
        assert!(!frame.masked);
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn test_read_close_status() {
        let mut payload = 1001u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"bye");
        let wire = encode(true, OpCode::Close, Some(KEY), &payload);

        let mut buf = [0u8; 64];
        let frame = read_frame(&mut wire.as_slice(), &mut buf).await.unwrap();
        assert_eq!(frame.close_status, Some(1001));
        assert_eq!(frame.close_code(), Some(CloseCode::GoingAway));
        assert_eq!(&frame.payload[2..], b"bye");
    }

    #[tokio::test]
    async fn test_read_close_without_status() {
        let wire = encode(true, OpCode::Close, Some(KEY), &[]);
        let mut buf = [0u8; 16];
        let frame = read_frame(&mut wire.as_slice(), &mut buf).await.unwrap();
        assert_eq!(frame.close_status, None);
    }

    #[tokio::test]
    async fn test_read_insufficient_buffer_consumes_no_payload() {
        let wire = encode(true, OpCode::Binary, Some(KEY), &[7u8; 200]);
        let mut reader = wire.as_slice();
        let mut buf = [0u8; 64];

        let result = read_frame(&mut reader, &mut buf).await;
        assert!(matches!(
            result,
            Err(FrameError::InsufficientBuffer {
                required: 208,
                capacity: 64
            })
        ));
        // header (4 bytes) and key (4 bytes) consumed, payload untouched
        assert_eq!(reader.len(), 200);
    }

    #[tokio::test]
    async fn test_read_hostile_length() {
        let wire = [0x82u8, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut buf = [0u8; 4096];
        let result = read_frame(&mut &wire[..], &mut buf).await;
        assert!(matches!(
            result,
            Err(FrameError::InsufficientBuffer { required: u64::MAX, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_eof_is_timeout() {
        let mut buf = [0u8; 16];
        let result = read_frame(&mut &[][..], &mut buf).await;
        assert!(matches!(result, Err(FrameError::ConnectionTimedOut)));

        // truncated mid-payload
        let wire = [0x81u8, 0x05, b'H', b'e'];
        let result = read_frame(&mut &wire[..], &mut buf).await;
        assert!(matches!(result, Err(FrameError::ConnectionTimedOut)));
    }

    #[tokio::test]
    async fn test_read_consecutive_frames() {
        let mut wire = encode(false, OpCode::Text, Some(KEY), b"one ");
        wire.extend(encode(true, OpCode::Continuation, Some(KEY), b"two"));
        let mut reader = wire.as_slice();
        let mut buf = [0u8; 32];

        let first = read_frame(&mut reader, &mut buf).await.unwrap();
        assert_eq!((first.fin, first.opcode), (false, OpCode::Text));
        assert_eq!(first.payload, b"one ");

        let second = read_frame(&mut reader, &mut buf).await.unwrap();
        assert_eq!((second.fin, second.opcode), (true, OpCode::Continuation));
        assert_eq!(second.payload, b"two");
    }
}
