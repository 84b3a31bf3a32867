//! Telemetry sample types.
//!
//! A sample is one reading produced by a sensor poll.  It is serialized to a
//! flat JSON object for the wire:
//!
//! ```text
//! GPS fix      → type 1, {"time":"2024-05-01T12:00:00.000Z","lat":45.0,"lon":-122.0}
//! Orientation  → type 2, {"roll":1.5,"pitch":-0.25,"yaw":270.0}
//! ```
//!
//! GPS fields the receiver did not report are omitted from the object rather
//! than sent as `null`, so a client can tell "unknown" from "zero".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::messages::{Frame, Message, MessageType};

/// Errors produced while converting between samples and frames.
#[derive(Debug, Error)]
pub enum SampleError {
    /// The frame carries a type tag that has no sample type.
    #[error("unknown message type {0}")]
    UnknownType(u32),

    /// The payload is not valid JSON for the sample type.
    #[error("invalid sample payload: {0}")]
    Json(#[from] serde_json::Error),
}

// ── GPS ───────────────────────────────────────────────────────────────────────

/// A position / velocity fix.
///
/// Every field is independently optional: a receiver without a 3-D fix, for
/// example, reports `lat`/`lon` but no `alt`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    /// UTC timestamp as reported by the receiver (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Latitude in degrees, positive north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    /// Longitude in degrees, positive east.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    /// Altitude in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
    /// Ground speed in metres per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Climb (or sink) rate in metres per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climb: Option<f64>,
    /// Longitude error estimate in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epx: Option<f64>,
    /// Latitude error estimate in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epy: Option<f64>,
    /// Vertical error estimate in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epv: Option<f64>,
}

impl GpsFix {
    /// Overwrites fields of `self` with every field present in `newer`.
    ///
    /// Fields absent from `newer` keep their current value.
    pub fn merge_from(&mut self, newer: &GpsFix) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }
        take(&mut self.time, &newer.time);
        take(&mut self.lat, &newer.lat);
        take(&mut self.lon, &newer.lon);
        take(&mut self.alt, &newer.alt);
        take(&mut self.speed, &newer.speed);
        take(&mut self.climb, &newer.climb);
        take(&mut self.epx, &newer.epx);
        take(&mut self.epy, &newer.epy);
        take(&mut self.epv, &newer.epv);
    }
}

// ── Orientation ───────────────────────────────────────────────────────────────

/// Roll, pitch and yaw in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

// ── TelemetrySample ───────────────────────────────────────────────────────────

/// One reading from any supported sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetrySample {
    Gps(GpsFix),
    Orientation(Orientation),
}

impl TelemetrySample {
    /// The wire tag this sample is broadcast under.
    pub fn message_type(&self) -> MessageType {
        match self {
            TelemetrySample::Gps(_) => MessageType::Gps,
            TelemetrySample::Orientation(_) => MessageType::Orientation,
        }
    }

    /// Serializes the sample into an immutable queue [`Message`].
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Json`] if serialization fails.
    pub fn to_message(&self) -> Result<Message, SampleError> {
        let payload = match self {
            TelemetrySample::Gps(fix) => serde_json::to_vec(fix)?,
            TelemetrySample::Orientation(o) => serde_json::to_vec(o)?,
        };
        Ok(Message::new(self.message_type(), payload))
    }

    /// Parses a received [`Frame`] back into a sample.
    ///
    /// # Errors
    ///
    /// - [`SampleError::UnknownType`] for a tag other than GPS or orientation.
    /// - [`SampleError::Json`] if the payload does not match the sample shape.
    pub fn from_frame(frame: &Frame) -> Result<Self, SampleError> {
        match frame.kind() {
            Some(MessageType::Gps) => Ok(TelemetrySample::Gps(serde_json::from_slice(
                &frame.payload,
            )?)),
            Some(MessageType::Orientation) => Ok(TelemetrySample::Orientation(
                serde_json::from_slice(&frame.payload)?,
            )),
            None => Err(SampleError::UnknownType(frame.message_type)),
        }
    }
}

impl From<GpsFix> for TelemetrySample {
    fn from(fix: GpsFix) -> Self {
        TelemetrySample::Gps(fix)
    }
}

impl From<Orientation> for TelemetrySample {
    fn from(o: Orientation) -> Self {
        TelemetrySample::Orientation(o)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
