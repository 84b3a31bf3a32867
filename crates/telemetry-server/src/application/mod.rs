//! Application layer for the telemetry server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure data types in `telemetry_core`) and the infrastructure (sockets,
//! serial ports, files).
//!
//! Code in this layer:
//!
//! - **Orchestrates** domain objects to fulfil a goal (e.g., "keep polling this
//!   sensor and queue every reading for broadcast, reconnecting if it drops").
//! - **Depends on abstractions** (the [`sample_reader::SensorSource`] trait)
//!   rather than concrete drivers, so tests can substitute scripted sensors.
//! - **Contains no socket I/O**.
//!
//! # Sub-modules
//!
//! - **`sample_reader`**  – Per-sensor poll loop with the acquire / poll /
//!   recover state machine.  Loss of a device degrades to "no samples", never
//!   to a crash.
//!
//! - **`outbound_queue`** – Multi-producer, single-consumer FIFO between the
//!   sample readers and the broadcaster.  Pushing never blocks.
//!
//! - **`stop_signal`**    – Cooperative cancellation flag shared between a
//!   task and whoever owns its shutdown.

pub mod outbound_queue;
pub mod sample_reader;
pub mod stop_signal;
