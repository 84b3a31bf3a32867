//! telemetry-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does telemetry-client do? (for beginners)
//!
//! The server pushes every new sensor reading to all connected clients.
//! The client:
//!
//! 1. Connects to the server over TCP, reconnecting after a pause whenever
//!    the connection drops.
//! 2. Reads length-prefixed frames and decodes each into a
//!    [`telemetry_core::TelemetrySample`].
//! 3. Folds the samples into a [`TelemetryTracker`], which keeps the latest
//!    known value of every field.
//!
//! The client never sends anything; the server treats the connection as a
//! one-way feed.

/// Application layer: telemetry state tracking.
pub mod application;

/// Infrastructure layer: the TCP connection to the server.
pub mod infrastructure;

pub use application::track_telemetry::TelemetryTracker;
