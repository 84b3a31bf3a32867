//! Domain entities for the telemetry relay.
//!
//! This module contains pure data types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Describes *what* the system talks about, here GPS fixes and orientation
//!   readings.
//! - Has **no** imports from sensor drivers, sockets, or runtimes.
//! - Can be compiled and tested on any machine without hardware attached.
//!
//! Sensor backends in the server produce these types; the client consumes
//! them.  Neither side needs to know how the other is implemented.

/// Telemetry sample types and their JSON payload mapping.
///
/// See [`sample::TelemetrySample`] for the main type.
pub mod sample;
