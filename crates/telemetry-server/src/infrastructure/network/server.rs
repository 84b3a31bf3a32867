//! Server assembly and lifecycle.
//!
//! [`TelemetryServer::bind`] creates the listening socket (failing fast if the
//! address is unavailable).  [`TelemetryServer::start`] wires the pipeline:
//!
//! ```text
//! sensor ─▶ SampleReader thread ─┐
//! sensor ─▶ SampleReader thread ─┼─▶ OutboundQueue ─▶ Broadcaster task ─▶ clients
//! sensor ─▶ SampleReader thread ─┘                          ▲
//!                                    Acceptor task ─▶ ConnectionRegistry
//! ```
//!
//! Every task and thread gets its own [`StopSignal`].
//! [`RunningServer::shutdown`] raises them all, waits for each to exit, and
//! then closes whatever connections are still registered.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::acceptor::{Acceptor, DiscardInbound, InboundHandler};
use super::broadcaster::Broadcaster;
use super::registry::ConnectionRegistry;
use crate::application::outbound_queue::{OutboundQueue, DEFAULT_QUEUE_CAPACITY};
use crate::application::sample_reader::{ReaderStats, ReaderTiming, SampleReader, SensorSource};
use crate::application::stop_signal::StopSignal;

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Runtime parameters for the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind_address: IpAddr,
    pub port: u16,
    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,
    /// Longest the acceptor waits before re-checking its stop signal.
    pub wait_timeout: Duration,
    /// Deadline for the rest of a client frame once its first byte arrived.
    pub read_timeout: Duration,
    /// Interval between broadcaster queue checks.
    pub broadcast_period: Duration,
    /// Deadline for one broadcast write to one client.
    pub write_timeout: Duration,
    /// Outbound queue capacity; `0` means unbounded.
    pub queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9000,
            backlog: 8,
            wait_timeout: Duration::from_secs(5),
            read_timeout: telemetry_core::protocol::DEFAULT_READ_DEADLINE,
            broadcast_period: Duration::from_millis(100),
            write_timeout: Duration::from_secs(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// One sensor and the timing its reader should use.
pub struct SensorSpec {
    pub source: Box<dyn SensorSource>,
    pub timing: ReaderTiming,
}

impl SensorSpec {
    pub fn new(source: Box<dyn SensorSource>, timing: ReaderTiming) -> Self {
        Self { source, timing }
    }
}

// ── TelemetryServer ───────────────────────────────────────────────────────────

/// A bound but not yet running server.
pub struct TelemetryServer {
    listener: TcpListener,
    settings: ServerSettings,
    handler: Arc<dyn InboundHandler>,
}

impl TelemetryServer {
    /// Binds the listening socket with address reuse and the configured backlog.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the socket cannot be created, bound,
    /// or put into listening mode.
    pub fn bind(settings: ServerSettings) -> Result<Self, ServerError> {
        let addr = settings.socket_addr();
        let bind_err = |source| ServerError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(settings.backlog).map_err(bind_err)?;

        Ok(Self {
            listener,
            settings,
            handler: Arc::new(DiscardInbound),
        })
    }

    /// Replaces the default log-and-discard handler for client frames.
    pub fn with_inbound_handler(mut self, handler: Arc<dyn InboundHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// The address actually bound (useful with port `0`).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts one reader thread per sensor plus the broadcaster and acceptor.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Spawn`] if a reader thread cannot be created.
    /// Readers already started are told to stop.
    pub fn start(self, sensors: Vec<SensorSpec>) -> Result<RunningServer, ServerError> {
        let local_addr = self
            .listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: self.settings.socket_addr(),
                source,
            })?;
        let queue = Arc::new(OutboundQueue::new(self.settings.queue_capacity));
        let registry = Arc::new(ConnectionRegistry::new());

        let mut readers = Vec::with_capacity(sensors.len());
        for (index, spec) in sensors.into_iter().enumerate() {
            let stop = StopSignal::new();
            let name = format!("{}-reader-{index}", spec.source.message_type().label());
            let reader = SampleReader::new(spec.source, Arc::clone(&queue), spec.timing, stop.clone());
            match reader.spawn(name) {
                Ok(handle) => readers.push((stop, handle)),
                Err(e) => {
                    for (stop, _) in &readers {
                        stop.raise();
                    }
                    return Err(ServerError::Spawn(e));
                }
            }
        }

        let broadcaster_stop = StopSignal::new();
        let broadcaster = tokio::spawn(
            Broadcaster::new(
                Arc::clone(&queue),
                Arc::clone(&registry),
                self.settings.broadcast_period,
                self.settings.write_timeout,
                broadcaster_stop.clone(),
            )
            .run(),
        );

        let acceptor_stop = StopSignal::new();
        let acceptor = tokio::spawn(
            Acceptor::new(
                self.listener,
                Arc::clone(&registry),
                self.handler,
                self.settings.wait_timeout,
                self.settings.read_timeout,
                acceptor_stop.clone(),
            )
            .run(),
        );

        info!(
            "telemetry server running on {local_addr} with {} sensor(s)",
            readers.len()
        );

        Ok(RunningServer {
            local_addr,
            registry,
            queue,
            readers,
            broadcaster: (broadcaster_stop, broadcaster),
            acceptor: (acceptor_stop, acceptor),
        })
    }
}

// ── RunningServer ─────────────────────────────────────────────────────────────

/// Handle to a started server.
pub struct RunningServer {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<OutboundQueue>,
    readers: Vec<(StopSignal, std::thread::JoinHandle<ReaderStats>)>,
    broadcaster: (StopSignal, JoinHandle<()>),
    acceptor: (StopSignal, JoinHandle<()>),
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    /// Stops every task and thread, then closes all remaining connections.
    ///
    /// Each task finishes its current bounded wait before exiting, so this
    /// takes at most about one `wait_timeout`.
    pub async fn shutdown(self) {
        info!("telemetry server shutting down");

        for (stop, _) in &self.readers {
            stop.raise();
        }
        self.broadcaster.0.raise();
        self.acceptor.0.raise();

        if let Err(e) = self.acceptor.1.await {
            warn!("acceptor task ended abnormally: {e}");
        }
        if let Err(e) = self.broadcaster.1.await {
            warn!("broadcaster task ended abnormally: {e}");
        }

        for (_, handle) in self.readers {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(_stats)) => {}
                Ok(Err(_)) => warn!("sample reader thread panicked"),
                Err(e) => warn!("could not join sample reader thread: {e}"),
            }
        }

        let leftover = self.registry.drain();
        let count = leftover.len();
        for conn in leftover {
            conn.close().await;
        }
        info!(
            "telemetry server stopped ({count} connection(s) closed, {} message(s) dropped on overflow)",
            self.queue.dropped()
        );
    }
}
