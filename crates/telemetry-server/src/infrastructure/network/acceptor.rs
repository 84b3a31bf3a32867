//! Acceptor / multiplexer: the server's central I/O loop.
//!
//! One task waits on three things at once:
//!
//! 1. the listening socket, for new clients;
//! 2. one pending frame read per connected client, kept in a
//!    [`FuturesUnordered`] so whichever client speaks first is served first;
//! 3. a `wait_timeout` sleep, so the stop signal is re-checked even when
//!    nothing happens.
//!
//! # Connection lifecycle
//!
//! ```text
//! accept ─▶ registry.add ─▶ read frame ─┬─ frame  ─▶ inbound handler ─▶ read again
//!                                       ├─ error  ─▶ close + registry.remove
//!                                       └─ flagged by broadcaster ─▶ close + remove
//! ```
//!
//! The acceptor is the only task that adds or removes registry members while
//! the server runs.  Removal always closes the connection first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use telemetry_core::{read_frame, DecodeError, Frame};
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::registry::ConnectionRegistry;
use crate::application::stop_signal::StopSignal;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

// ── Inbound hook ──────────────────────────────────────────────────────────────

/// Receives frames sent by clients.
///
/// Broadcast is one-directional, so the server has nothing to do with client
/// traffic by default; embedders can plug in their own handler.
pub trait InboundHandler: Send + Sync {
    fn handle(&self, connection: &Connection, frame: Frame);
}

/// Logs inbound frames and discards them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardInbound;

impl InboundHandler for DiscardInbound {
    fn handle(&self, connection: &Connection, frame: Frame) {
        debug!(
            "ignoring {}-byte frame of type {} from {}",
            frame.payload.len(),
            frame.message_type,
            connection.peer()
        );
    }
}

// ── Pending reads ─────────────────────────────────────────────────────────────

enum ReadOutcome {
    Frame(Frame),
    Failed(DecodeError),
    Flagged,
}

type PendingRead = BoxFuture<'static, (Arc<Connection>, BoxedReader, ReadOutcome)>;

/// Reads one frame, or stops early if the broadcaster flags the connection.
fn read_next(conn: Arc<Connection>, mut reader: BoxedReader, deadline: Duration) -> PendingRead {
    async move {
        let outcome = tokio::select! {
            biased;
            _ = conn.failed() => ReadOutcome::Flagged,
            result = read_frame(&mut reader, deadline) => match result {
                Ok(frame) => ReadOutcome::Frame(frame),
                Err(e) => ReadOutcome::Failed(e),
            },
        };
        (conn, reader, outcome)
    }
    .boxed()
}

// ── Acceptor ──────────────────────────────────────────────────────────────────

pub struct Acceptor {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn InboundHandler>,
    wait_timeout: Duration,
    read_timeout: Duration,
    stop: StopSignal,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<dyn InboundHandler>,
        wait_timeout: Duration,
        read_timeout: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            listener,
            registry,
            handler,
            wait_timeout,
            read_timeout,
            stop,
        }
    }

    /// Runs until the stop signal is raised.
    ///
    /// The listening socket is closed when this returns.  Connections still in
    /// the registry are left for the server's shutdown sweep.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("accepting telemetry clients on {addr}"),
            Err(e) => warn!("listener address unavailable: {e}"),
        }

        let mut pending: FuturesUnordered<PendingRead> = FuturesUnordered::new();

        while !self.stop.is_raised() {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => pending.push(self.admit(stream, peer)),
                    Err(e) => warn!("accept failed: {e}"),
                },
                Some((conn, reader, outcome)) = pending.next(), if !pending.is_empty() => {
                    match outcome {
                        ReadOutcome::Frame(frame) => {
                            self.handler.handle(&conn, frame);
                            pending.push(read_next(conn, reader, self.read_timeout));
                        }
                        ReadOutcome::Failed(e) => {
                            let reason = if e.is_orderly_close() {
                                "closed by peer".to_string()
                            } else {
                                e.to_string()
                            };
                            self.retire(conn, &reason).await;
                        }
                        ReadOutcome::Flagged => self.retire(conn, "write failed").await,
                    }
                },
                _ = tokio::time::sleep(self.wait_timeout) => {}
            }
        }

        info!("acceptor stopped");
    }

    /// Registers a freshly accepted socket and returns its first pending read.
    fn admit(&self, stream: TcpStream, peer: SocketAddr) -> PendingRead {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY for {peer}: {e}");
        }
        let (reader, writer) = stream.into_split();
        let conn = Arc::new(Connection::new(peer, writer));
        self.registry.add(Arc::clone(&conn));
        info!("client connected: {peer} ({} total)", self.registry.len());
        read_next(conn, Box::new(reader), self.read_timeout)
    }

    /// Closes a dead connection and removes it from the registry.
    async fn retire(&self, conn: Arc<Connection>, reason: &str) {
        conn.close().await;
        if self.registry.remove(conn.id()).is_some() {
            info!(
                "client disconnected: {} ({reason}, {} remaining)",
                conn.peer(),
                self.registry.len()
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use telemetry_core::encode_frame;
    use tokio::io::AsyncWriteExt;

    use super::*;

    /// Records every inbound frame.
    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<Frame>>,
    }

    impl InboundHandler for Recorder {
        fn handle(&self, _connection: &Connection, frame: Frame) {
            self.frames.lock().unwrap().push(frame);
        }
    }

    async fn start(
        handler: Arc<dyn InboundHandler>,
    ) -> (SocketAddr, Arc<ConnectionRegistry>, StopSignal, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let stop = StopSignal::new();
        let acceptor = Acceptor::new(
            listener,
            Arc::clone(&registry),
            handler,
            Duration::from_millis(50),
            Duration::from_millis(500),
            stop.clone(),
        );
        let task = tokio::spawn(acceptor.run());
        (addr, registry, stop, task)
    }

    async fn wait_for_len(registry: &ConnectionRegistry, len: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.len() != len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {len} connections"));
    }

    #[tokio::test]
    async fn test_accepted_client_is_added_to_registry() {
        let (addr, registry, stop, task) = start(Arc::new(DiscardInbound)).await;

        let _client = TcpStream::connect(addr).await.unwrap();

        wait_for_len(&registry, 1).await;
        stop.raise();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_client_is_removed_from_registry() {
        // Arrange
        let (addr, registry, stop, task) = start(Arc::new(DiscardInbound)).await;
        let client = TcpStream::connect(addr).await.unwrap();
        wait_for_len(&registry, 1).await;

        // Act
        drop(client);

        // Assert
        wait_for_len(&registry, 0).await;
        stop.raise();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_inbound_frames_reach_handler_and_connection_stays() {
        // Arrange
        let recorder = Arc::new(Recorder::default());
        let (addr, registry, stop, task) = start(Arc::clone(&recorder) as Arc<dyn InboundHandler>).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        wait_for_len(&registry, 1).await;

        // Act
        client.write_all(&encode_frame(9, b"hello").unwrap()).await.unwrap();
        client.write_all(&encode_frame(9, b"again").unwrap()).await.unwrap();

        // Assert
        tokio::time::timeout(Duration::from_secs(2), async {
            while recorder.frames.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(recorder.frames.lock().unwrap()[1].payload, b"again");
        assert_eq!(registry.len(), 1);
        stop.raise();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_stalling_mid_frame_is_dropped_after_read_timeout() {
        let (addr, registry, stop, task) = start(Arc::new(DiscardInbound)).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        wait_for_len(&registry, 1).await;

        // Half a header, then silence past the 500 ms deadline.
        client.write_all(&[0, 0]).await.unwrap();

        wait_for_len(&registry, 0).await;
        stop.raise();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_flagged_by_broadcaster_is_removed() {
        // Arrange
        let (addr, registry, stop, task) = start(Arc::new(DiscardInbound)).await;
        let _client = TcpStream::connect(addr).await.unwrap();
        wait_for_len(&registry, 1).await;
        let conn = registry.snapshot().remove(0);

        // Act
        conn.mark_failed();

        // Assert
        wait_for_len(&registry, 0).await;
        stop.raise();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let (addr, _registry, stop, task) = start(Arc::new(DiscardInbound)).await;

        stop.raise();
        task.await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
