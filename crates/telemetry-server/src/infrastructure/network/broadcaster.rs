//! Broadcaster: the single consumer of the outbound queue.
//!
//! Every `period` the broadcaster drains the queue and, message by message,
//! writes each one to every connection in a fresh registry snapshot.
//!
//! # Guarantees
//!
//! - **Per-connection order.**  All writes of one message finish (or fail)
//!   before the next message starts, so every client sees a source's samples
//!   in the order that source queued them.
//! - **Isolation.**  A failed or timed-out write affects only that connection:
//!   it is flagged with [`Connection::mark_failed`] and the remaining
//!   connections still receive the message in the same cycle.
//! - **No membership changes.**  Flagged connections are left for the acceptor
//!   to close and remove.
//! - **No replay.**  A client added after a message was written never gets it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use telemetry_core::encode_message;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::registry::ConnectionRegistry;
use crate::application::outbound_queue::OutboundQueue;
use crate::application::stop_signal::StopSignal;

/// What one [`Broadcaster::flush`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages taken from the queue.
    pub messages: usize,
    /// Successful (message, connection) writes.
    pub deliveries: usize,
    /// Failed (message, connection) writes.
    pub failures: usize,
}

pub struct Broadcaster {
    queue: Arc<OutboundQueue>,
    registry: Arc<ConnectionRegistry>,
    period: Duration,
    write_timeout: Duration,
    stop: StopSignal,
}

impl Broadcaster {
    pub fn new(
        queue: Arc<OutboundQueue>,
        registry: Arc<ConnectionRegistry>,
        period: Duration,
        write_timeout: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            queue,
            registry,
            period,
            write_timeout,
            stop,
        }
    }

    /// Flushes the queue every period until the stop signal is raised.
    pub async fn run(self) {
        info!("broadcaster started (period {:?})", self.period);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if self.stop.is_raised() {
                break;
            }
            self.flush().await;
        }
        info!("broadcaster stopped");
    }

    /// Drains the queue once and writes every drained message to every
    /// connection that is not already flagged as failed.
    pub async fn flush(&self) -> FlushReport {
        let messages = self.queue.drain();
        let mut report = FlushReport {
            messages: messages.len(),
            ..FlushReport::default()
        };

        for message in messages {
            let bytes = match encode_message(&message) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("dropping unencodable {} message: {e}", message.message_type());
                    continue;
                }
            };

            let targets: Vec<Arc<Connection>> = self
                .registry
                .snapshot()
                .into_iter()
                .filter(|c| !c.is_failed())
                .collect();

            let results = join_all(
                targets
                    .iter()
                    .map(|conn| conn.send(&bytes, self.write_timeout)),
            )
            .await;

            for (conn, result) in targets.iter().zip(results) {
                match result {
                    Ok(()) => report.deliveries += 1,
                    Err(e) => {
                        warn!("write to {} failed, flagging for removal: {e}", conn.peer());
                        conn.mark_failed();
                        report.failures += 1;
                    }
                }
            }
        }

        if report.messages > 0 {
            debug!(
                "flushed {} messages: {} deliveries, {} failures",
                report.messages, report.deliveries, report.failures
            );
        }
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
