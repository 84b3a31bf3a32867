//! Telemetry relay message types.
//!
//! A [`Frame`] is what travels on the wire; a [`Message`] is what a sample
//! reader places on the outbound queue.  Both carry a type tag and an opaque
//! payload, but only a `Message` is guaranteed to carry a known tag.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the frame header: `length:u32` followed by `type:u32`.
pub const HEADER_SIZE: usize = 8;

/// Largest payload accepted in either direction (1 MiB).
///
/// Telemetry samples are a few hundred bytes at most.  The limit exists so a
/// corrupt or hostile length field cannot make the server allocate gigabytes.
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

// ── Message type codes ────────────────────────────────────────────────────────

/// Telemetry kinds broadcast by the server.
///
/// The discriminant is the `type` field written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageType {
    /// Position / velocity fix from a GPS receiver.
    Gps = 1,
    /// Roll, pitch and yaw from an orientation sensor.
    Orientation = 2,
}

impl MessageType {
    /// Returns the wire tag for this type.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Short lowercase label used in log lines and thread names.
    pub fn label(self) -> &'static str {
        match self {
            MessageType::Gps => "gps",
            MessageType::Orientation => "orientation",
        }
    }
}

impl TryFrom<u32> for MessageType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            1 => Ok(MessageType::Gps),
            2 => Ok(MessageType::Orientation),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One complete, length-prefixed unit on the wire.
///
/// ```text
/// [length:4][type:4][payload:length]   (all integers big-endian)
/// ```
///
/// The type tag is kept as a raw `u32` because inbound client traffic is not
/// restricted to the tags the server itself produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw type tag as read from the wire.
    pub message_type: u32,
    /// Payload bytes; `payload.len()` is the length field.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame from a raw tag and payload.
    pub fn new(message_type: u32, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    /// Returns the known [`MessageType`] for this frame, if any.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::try_from(self.message_type).ok()
    }

    /// Total number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Frame::new(message.message_type.code(), message.payload)
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// A serialized sample paired with its type tag, queued for broadcast.
///
/// Fields are private: once a `Message` has been built it cannot be altered,
/// so every connection receives exactly the bytes the producer enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    payload: Vec<u8>,
}

impl Message {
    /// Creates a message from a type tag and an already-serialized payload.
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
