//! Infrastructure layer for the telemetry server.
//!
//! Contains OS-facing adapters: TCP networking, sensor device drivers, and
//! configuration file loading.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `telemetry_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod sensors;
pub mod storage;
