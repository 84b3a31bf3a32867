//! Configuration loading for the telemetry server.

pub mod config;
