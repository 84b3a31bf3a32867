//! # telemetry-core
//!
//! Shared library for the telemetry relay containing the wire protocol codec
//! and the telemetry sample types.
//!
//! This crate is used by both the server and client applications.
//! It has no dependencies on sensor drivers, sockets, or configuration.
//!
//! # Architecture overview (for beginners)
//!
//! The telemetry relay reads GPS fixes and orientation angles from sensors
//! attached to one machine (the "server") and streams them to any number of
//! connected "clients" in real time.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Every message is a
//!   frame with an 8-byte header (payload length and type tag) followed by the
//!   payload.  Frames are read whole or not at all.
//!
//! - **`domain`** – The samples themselves: [`GpsFix`], [`Orientation`] and the
//!   [`TelemetrySample`] enum that ties them to their wire type tag.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `telemetry_core::GpsFix` instead of `telemetry_core::domain::sample::GpsFix`.
pub use domain::sample::{GpsFix, Orientation, SampleError, TelemetrySample};
pub use protocol::codec::{
    decode_frame, encode_frame, encode_message, read_frame, write_frame, DecodeError,
    ProtocolError,
};
pub use protocol::messages::{Frame, Message, MessageType};
