//! Network infrastructure for the client application.
//!
//! Handles the TCP connection to the telemetry server and forwards decoded
//! samples to the application layer.
//!
//! Architecture:
//! - `TelemetryConnection` runs a reconnect loop on a Tokio task.
//! - Each received frame is decoded into a [`TelemetrySample`] and forwarded
//!   on an `mpsc` channel as a [`NetworkEvent`].
//! - Frames with an unknown type tag or an undecodable payload are logged and
//!   skipped; they do not end the connection.
//! - The loop stops when the stop flag is cleared or the receiver is dropped.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use telemetry_core::{read_frame, DecodeError, TelemetrySample};
use thiserror::Error;
use tokio::{io::AsyncRead, net::TcpStream, sync::mpsc, time};
use tracing::{debug, info, warn};

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientNetworkError {
    /// TCP connection to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// A frame could not be read from the established connection.
    #[error("receive error: {0}")]
    Decode(#[from] DecodeError),
    /// The connection was closed by the server between frames.
    #[error("connection closed by server")]
    Closed,
    /// The application dropped the event receiver.
    #[error("event receiver dropped")]
    ReceiverGone,
}

/// Configuration for the client's network connection.
#[derive(Debug, Clone)]
pub struct ClientConnectionConfig {
    /// Address of the server's TCP port.
    pub server_addr: SocketAddr,
    /// Reconnect interval when the connection drops or cannot be made.
    pub reconnect_interval: Duration,
    /// Deadline for the rest of a frame once its first byte arrived.
    pub read_timeout: Duration,
}

impl Default for ClientConnectionConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)),
            reconnect_interval: Duration::from_secs(5),
            read_timeout: telemetry_core::protocol::DEFAULT_READ_DEADLINE,
        }
    }
}

/// Events emitted by the network layer to the application layer.
#[derive(Debug)]
pub enum NetworkEvent {
    /// The TCP connection was established.
    Connected { server_addr: SocketAddr },
    /// A sample was received from the server.
    Sample(TelemetrySample),
    /// The TCP connection was lost.
    Disconnected,
}

/// Manages the TCP connection from the client to the server.
pub struct TelemetryConnection {
    config: ClientConnectionConfig,
}

impl TelemetryConnection {
    pub fn new(config: ClientConnectionConfig) -> Self {
        Self { config }
    }

    /// Spawns the reconnect loop and returns the event receiver.
    ///
    /// Runs until `running` is set to false or the receiver is dropped.
    pub fn start(self: Arc<Self>, running: Arc<AtomicBool>) -> mpsc::Receiver<NetworkEvent> {
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) && !tx.is_closed() {
                match self.connect().await {
                    Ok(stream) => {
                        let addr = self.config.server_addr;
                        info!("connected to server at {addr}");
                        if tx.send(NetworkEvent::Connected { server_addr: addr }).await.is_err() {
                            break;
                        }

                        let reason = self.read_loop(stream, &tx, &running).await;
                        match reason {
                            ClientNetworkError::ReceiverGone => break,
                            ClientNetworkError::Closed => info!("server closed the connection"),
                            other => warn!("connection lost: {other}"),
                        }
                        if tx.send(NetworkEvent::Disconnected).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("{e}"),
                }

                if !running.load(Ordering::Relaxed) {
                    break;
                }
                debug!("reconnecting in {:?}", self.config.reconnect_interval);
                tokio::select! {
                    _ = time::sleep(self.config.reconnect_interval) => {}
                    _ = tx.closed() => break,
                }
            }
            debug!("telemetry connection loop exited");
        });

        rx
    }

    async fn connect(&self) -> Result<TcpStream, ClientNetworkError> {
        let addr = self.config.server_addr;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientNetworkError::ConnectFailed { addr, source })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }
        Ok(stream)
    }

    /// Reads frames until the connection fails; returns the reason it ended.
    async fn read_loop<R>(
        &self,
        mut stream: R,
        tx: &mpsc::Sender<NetworkEvent>,
        running: &AtomicBool,
    ) -> ClientNetworkError
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let frame = tokio::select! {
                result = read_frame(&mut stream, self.config.read_timeout) => result,
                _ = tx.closed() => return ClientNetworkError::ReceiverGone,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) if e.is_orderly_close() => return ClientNetworkError::Closed,
                Err(e) => return ClientNetworkError::Decode(e),
            };

            match TelemetrySample::from_frame(&frame) {
                Ok(sample) => {
                    if tx.send(NetworkEvent::Sample(sample)).await.is_err() {
                        return ClientNetworkError::ReceiverGone;
                    }
                }
                Err(e) => warn!("skipping frame of type {}: {e}", frame.message_type),
            }

            if !running.load(Ordering::Relaxed) {
                return ClientNetworkError::ReceiverGone;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use telemetry_core::{encode_frame, GpsFix, MessageType};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    use super::*;

    fn config_for(addr: SocketAddr) -> ClientConnectionConfig {
        ClientConnectionConfig {
            server_addr: addr,
            reconnect_interval: Duration::from_millis(20),
            read_timeout: Duration::from_secs(1),
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<NetworkEvent>) -> NetworkEvent {
        time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("no event within 3 s")
            .expect("event channel closed")
    }

    #[test]
    fn test_default_config_targets_local_port_9000() {
        // Arrange / Act
        let cfg = ClientConnectionConfig::default();

        // Assert
        assert_eq!(cfg.server_addr.port(), 9000);
        assert!(cfg.server_addr.ip().is_loopback());
        assert_eq!(cfg.reconnect_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_received_frames_become_sample_events() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let conn = Arc::new(TelemetryConnection::new(config_for(addr)));
        let mut rx = conn.start(Arc::clone(&running));
        let (mut server_side, _) = listener.accept().await.unwrap();
        let fix = GpsFix {
            lat: Some(45.0),
            lon: Some(-122.0),
            ..GpsFix::default()
        };
        let message = TelemetrySample::Gps(fix.clone()).to_message().unwrap();

        // Act
        server_side
            .write_all(&encode_frame(99, b"ignored").unwrap())
            .await
            .unwrap();
        server_side
            .write_all(&encode_frame(MessageType::Gps.code(), message.payload()).unwrap())
            .await
            .unwrap();

        // Assert
        assert!(matches!(next_event(&mut rx).await, NetworkEvent::Connected { server_addr } if server_addr == addr));
        match next_event(&mut rx).await {
            NetworkEvent::Sample(TelemetrySample::Gps(received)) => assert_eq!(received, fix),
            other => panic!("unexpected event {other:?}"),
        }
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_reconnects_after_server_closes() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let conn = Arc::new(TelemetryConnection::new(config_for(addr)));
        let mut rx = conn.start(Arc::clone(&running));

        // Act
        let (first, _) = listener.accept().await.unwrap();
        drop(first);
        let (_second, _) = listener.accept().await.unwrap();

        // Assert
        assert!(matches!(next_event(&mut rx).await, NetworkEvent::Connected { .. }));
        assert!(matches!(next_event(&mut rx).await, NetworkEvent::Disconnected));
        assert!(matches!(next_event(&mut rx).await, NetworkEvent::Connected { .. }));
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_read_loop_skips_unknown_frames_and_reports_close() {
        // Arrange: an unknown tag, a GPS frame split across reads, then EOF.
        let fix = GpsFix {
            lat: Some(45.0),
            ..GpsFix::default()
        };
        let message = TelemetrySample::Gps(fix.clone()).to_message().unwrap();
        let gps_bytes = encode_frame(MessageType::Gps.code(), message.payload()).unwrap();
        let (head, tail) = gps_bytes.split_at(5);
        let stream = tokio_test::io::Builder::new()
            .read(&encode_frame(42, b"{}").unwrap())
            .read(head)
            .read(tail)
            .build();
        let conn = TelemetryConnection::new(ClientConnectionConfig::default());
        let (tx, mut rx) = mpsc::channel(8);
        let running = AtomicBool::new(true);

        // Act
        let reason = conn.read_loop(stream, &tx, &running).await;

        // Assert
        assert!(matches!(reason, ClientNetworkError::Closed));
        match rx.try_recv() {
            Ok(NetworkEvent::Sample(TelemetrySample::Gps(received))) => assert_eq!(received, fix),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "the unknown frame must not produce an event");
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_retrying_without_events() {
        // Arrange: bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let conn = Arc::new(TelemetryConnection::new(config_for(addr)));

        // Act
        let mut rx = conn.start(Arc::clone(&running));

        // Assert
        let waited = time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(waited.is_err(), "no event expected while the server is down");
        running.store(false, Ordering::Relaxed);
    }
}
