//! A single accepted client connection.
//!
//! The socket is split on accept: the acceptor keeps the read half inside its
//! pending-read future, and the write half lives here behind an async mutex so
//! the broadcaster can write without touching the acceptor.
//!
//! # Failure hand-off
//!
//! The broadcaster never removes connections.  When a write fails it calls
//! [`Connection::mark_failed`], which wakes the acceptor's pending read for
//! this connection via [`Connection::failed`].  The acceptor then closes the
//! connection and removes it from the registry, so membership has a single
//! writer in the steady state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// How long [`Connection::close`] waits for the writer to shut down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub type ConnectionId = Uuid;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Errors from writing to a client.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection already closed")]
    Closed,

    #[error("write did not complete within {0:?}")]
    Timeout(Duration),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One connected client.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    established_at: Instant,
    writer: Mutex<Option<BoxedWriter>>,
    failed: AtomicBool,
    failure: Notify,
}

impl Connection {
    /// Wraps the write side of a freshly accepted socket.
    pub fn new<W>(peer: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            peer,
            established_at: Instant::now(),
            writer: Mutex::new(Some(Box::new(writer))),
            failed: AtomicBool::new(false),
            failure: Notify::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    /// Writes `bytes` in full and flushes, giving up after `timeout`.
    ///
    /// Concurrent callers are serialized, so frames are never interleaved.
    ///
    /// # Errors
    ///
    /// [`SendError::Closed`] after [`Connection::close`], otherwise the I/O
    /// error or timeout that stopped the write.
    pub async fn send(&self, bytes: &[u8], timeout: Duration) -> Result<(), SendError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendError::Closed)?;

        let write = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(result) => result.map_err(SendError::Io),
            Err(_) => Err(SendError::Timeout(timeout)),
        }
    }

    /// Flags the connection as dead and wakes whoever awaits [`Connection::failed`].
    pub fn mark_failed(&self) {
        if !self.failed.swap(true, Ordering::AcqRel) {
            // notify_one stores a permit if nobody is waiting yet.
            self.failure.notify_one();
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Resolves once [`Connection::mark_failed`] has been called.
    ///
    /// Intended for a single waiter, the acceptor.
    pub async fn failed(&self) {
        if self.is_failed() {
            return;
        }
        self.failure.notified().await;
    }

    /// Shuts down and drops the writer.  Later sends fail with `Closed`.
    pub async fn close(&self) {
        let taken = self.writer.lock().await.take();
        if let Some(mut writer) = taken {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, writer.shutdown()).await;
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("failed", &self.is_failed())
            .finish()
    }
}
