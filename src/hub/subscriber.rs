//! Subscriber handle
//!
//! One `Subscriber` exists per live connection. It owns the connection's
//! buffered writer behind an async mutex, so the session's own replies and
//! hub fan-out deliveries never interleave on the socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use tokio::io::{AsyncWrite, BufWriter};
use tokio::sync::{Mutex, Notify};

use crate::protocol::{write_frame, write_reply, Reply};

/// Boxed write half of a connection
pub type ReplyWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Broker-side identity and output stream of one client
pub struct Subscriber {
    /// Session ID, unique for the process lifetime
    id: u64,

    /// Remote peer address
    peer_addr: SocketAddr,

    /// Name set by `CLIENT SETNAME`
    name: RwLock<Option<Bytes>>,

    /// Serialized write path
    writer: Mutex<ReplyWriter>,

    /// Set once a delivery failed; the stream may hold a partial frame
    broken: AtomicBool,

    /// Wakes the owning session when the subscriber is marked broken
    closed: Notify,
}

impl Subscriber {
    /// Create a subscriber around the write half of a connection
    pub fn new<W>(id: u64, peer_addr: SocketAddr, writer: W, buffer_size: usize) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            id,
            peer_addr,
            name: RwLock::new(None),
            writer: Mutex::new(BufWriter::with_capacity(buffer_size, writer)),
            broken: AtomicBool::new(false),
            closed: Notify::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Explicitly set name, if any
    pub fn name(&self) -> Option<Bytes> {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_name(&self, name: Bytes) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = Some(name);
    }

    /// Name used in logs: the explicit name or `client-<peer>`
    pub fn display_name(&self) -> String {
        match self.name() {
            Some(name) => String::from_utf8_lossy(&name).into_owned(),
            None => format!("client-{}", self.peer_addr),
        }
    }

    /// Encode and flush a reply on this subscriber's stream
    pub async fn send(&self, reply: &Reply) -> std::io::Result<()> {
        self.ensure_usable()?;
        let mut writer = self.writer.lock().await;
        write_reply(&mut *writer, reply).await
    }

    /// Flush a pre-encoded frame on this subscriber's stream
    pub async fn send_frame(&self, frame: &[u8]) -> std::io::Result<()> {
        self.ensure_usable()?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await
    }

    /// Mark the stream unusable and wake the owning session
    pub fn mark_broken(&self) {
        if !self.broken.swap(true, Ordering::AcqRel) {
            self.closed.notify_one();
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Resolves once [`mark_broken`](Self::mark_broken) has been called
    pub async fn closed(&self) {
        if self.is_broken() {
            return;
        }
        self.closed.notified().await;
    }

    fn ensure_usable(&self) -> std::io::Result<()> {
        if self.is_broken() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "subscriber stream is broken",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("name", &self.display_name())
            .field("broken", &self.is_broken())
            .finish()
    }
}
