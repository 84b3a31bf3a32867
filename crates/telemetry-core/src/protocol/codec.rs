//! Binary codec for telemetry relay frames.
//!
//! Wire format:
//! ```text
//! [length:4][type:4][payload:length]
//! ```
//! Header size: 8 bytes.  All integers are big-endian (network byte order).
//!
//! Two decoding entry points are provided:
//!
//! - [`decode_frame`] works on a byte slice that may or may not hold a whole
//!   frame.  It is pure and is what tests and benchmarks exercise.
//! - [`read_frame`] pulls exactly one frame from an async stream.  It is what
//!   the server and client use on live sockets.
//!
//! # All-or-nothing decoding
//!
//! Neither function ever hands back part of a frame.  A truncated buffer is
//! reported as [`ProtocolError::InsufficientData`]; a stream that closes or
//! stalls mid-frame is reported as [`DecodeError::ShortRead`] or
//! [`DecodeError::Timeout`], and whatever bytes were read for that frame are
//! dropped with the error.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::protocol::messages::{Frame, Message, HEADER_SIZE, MAX_PAYLOAD_LEN};

/// Default per-message deadline used by [`read_frame`] callers.
pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(15);

/// Errors produced by the buffer-based codec functions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice does not yet hold a complete frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The payload exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

/// Errors produced while reading a frame from a live stream.
///
/// Every variant means "no valid message"; callers treat any of them as the
/// end of the connection.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The peer closed the stream cleanly between frames.
    #[error("connection closed")]
    Closed,

    /// The peer closed the stream part-way through a frame.
    #[error("short read on {field}: expected {expected} bytes, received {received}")]
    ShortRead {
        field: &'static str,
        expected: usize,
        received: usize,
    },

    /// The rest of the frame did not arrive within the deadline.
    #[error("frame not completed within {0:?}")]
    Timeout(Duration),

    /// The length field announced a payload larger than [`MAX_PAYLOAD_LEN`].
    #[error("declared payload of {0} bytes exceeds the limit")]
    PayloadTooLarge(usize),

    /// The underlying stream reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// `true` when the peer simply went away between frames.
    pub fn is_orderly_close(&self) -> bool {
        matches!(self, DecodeError::Closed)
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes `payload` with the given type tag into a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds
/// [`MAX_PAYLOAD_LEN`].
///
/// # Examples
///
/// ```rust
/// use telemetry_core::protocol::{decode_frame, encode_frame};
///
/// let bytes = encode_frame(1, br#"{"lat":45.0}"#).unwrap();
/// let (frame, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(frame.message_type, 1);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_frame(message_type: u32, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&message_type.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Encodes a queued [`Message`] into a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds the limit.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(message.message_type().code(), message.payload())
}

// ── Buffer decoding ───────────────────────────────────────────────────────────

/// Decodes one [`Frame`] from the beginning of `bytes`.
///
/// Returns the frame and the number of bytes consumed so the caller can
/// advance a receive buffer.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] if `bytes` is a strict prefix of a
///   frame.  Nothing is returned for the partial frame.
/// - [`ProtocolError::PayloadTooLarge`] if the length field exceeds the limit.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let payload_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    let message_type = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

    let total = HEADER_SIZE + payload_len;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let payload = bytes[HEADER_SIZE..total].to_vec();
    Ok((Frame::new(message_type, payload), total))
}

// ── Stream I/O ────────────────────────────────────────────────────────────────

/// Reads exactly one frame from `reader`.
///
/// The wait for the first byte of a frame is unbounded, so an idle peer is
/// not mistaken for a dead one.  Once that byte arrives the remaining
/// `length`, `type` and `payload` fields are read in sequence and must all
/// arrive within `deadline`.
///
/// Reads that return `Interrupted` or `WouldBlock` are retried; a zero-length
/// read means the peer closed the stream.
///
/// # Errors
///
/// See [`DecodeError`].  On any error the bytes read so far are discarded.
pub async fn read_frame<R>(reader: &mut R, deadline: Duration) -> Result<Frame, DecodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut length = [0u8; 4];

    let first = loop {
        match reader.read(&mut length).await {
            Ok(n) => break n,
            Err(e) if is_transient(&e) => tokio::task::yield_now().await,
            Err(e) => return Err(DecodeError::Io(e)),
        }
    };
    if first == 0 {
        return Err(DecodeError::Closed);
    }

    match timeout(deadline, read_remainder(reader, length, first)).await {
        Ok(result) => result,
        Err(_) => Err(DecodeError::Timeout(deadline)),
    }
}

/// Completes a frame whose first `filled` length bytes are already in `length`.
async fn read_remainder<R>(
    reader: &mut R,
    mut length: [u8; 4],
    filled: usize,
) -> Result<Frame, DecodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    fill(reader, &mut length, filled, "length").await?;
    let payload_len = u32::from_be_bytes(length) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(DecodeError::PayloadTooLarge(payload_len));
    }

    let mut message_type = [0u8; 4];
    fill(reader, &mut message_type, 0, "type").await?;

    let mut payload = vec![0u8; payload_len];
    fill(reader, &mut payload, 0, "payload").await?;

    Ok(Frame::new(u32::from_be_bytes(message_type), payload))
}

/// Fills `buf[filled..]` completely or reports why it could not.
async fn fill<R>(
    reader: &mut R,
    buf: &mut [u8],
    mut filled: usize,
    field: &'static str,
) -> Result<(), DecodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => {
                return Err(DecodeError::ShortRead {
                    field,
                    expected: buf.len(),
                    received: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if is_transient(&e) => tokio::task::yield_now().await,
            Err(e) => return Err(DecodeError::Io(e)),
        }
    }
    Ok(())
}

/// Writes `frame` to `writer` in full and flushes it.
///
/// Errors are returned to the caller as-is; nothing is retried here.
///
/// # Errors
///
/// Returns `InvalidInput` if the payload exceeds [`MAX_PAYLOAD_LEN`], or the
/// writer's own I/O error.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = encode_frame(frame.message_type, &frame.payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
