//! Network infrastructure for the telemetry server.
//!
//! # Sub-modules
//!
//! - **`connection`**  – One accepted client: its write half, peer address and
//!   the failure flag the broadcaster uses to hand dead clients to the acceptor.
//!
//! - **`registry`**    – The lock-guarded set of live connections, with
//!   copy-out snapshots for iteration.
//!
//! - **`broadcaster`** – Drains the outbound queue on a fixed cadence and
//!   writes every message to every connection.
//!
//! - **`acceptor`**    – The multiplexed I/O loop: accepts clients, reads their
//!   frames, and retires dead connections.
//!
//! - **`server`**      – Binds the listener and starts or stops the whole
//!   pipeline.

pub mod acceptor;
pub mod broadcaster;
pub mod connection;
pub mod registry;
pub mod server;

pub use acceptor::{DiscardInbound, InboundHandler};
pub use connection::{Connection, ConnectionId};
pub use registry::ConnectionRegistry;
pub use server::{RunningServer, SensorSpec, ServerError, ServerSettings, TelemetryServer};
