//! Session state machine
//!
//! Tracks the protocol mode of one connection and the channels it has
//! joined. The joined set mirrors hub membership for this connection; the
//! hub stays authoritative.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;

/// Protocol mode of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// All commands accepted
    Normal,
    /// Only SUBSCRIBE / UNSUBSCRIBE accepted
    SubscribedOnly,
}

/// Per-connection state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Connection start time
    pub connected_at: Instant,

    /// Commands handled so far
    pub commands_processed: u64,

    /// Joined channels. The mode is derived from this set, so it is
    /// SubscribedOnly exactly when the set is non-empty.
    channels: BTreeSet<Bytes>,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            commands_processed: 0,
            channels: BTreeSet::new(),
        }
    }

    /// Current protocol mode
    pub fn mode(&self) -> SessionMode {
        if self.channels.is_empty() {
            SessionMode::Normal
        } else {
            SessionMode::SubscribedOnly
        }
    }

    /// Record a joined channel, returning the joined count
    pub fn join(&mut self, channel: Bytes) -> usize {
        self.channels.insert(channel);
        self.channels.len()
    }

    /// Forget a channel, returning whether it was joined and the remaining count
    pub fn leave(&mut self, channel: &Bytes) -> (bool, usize) {
        let removed = self.channels.remove(channel);
        (removed, self.channels.len())
    }

    /// Forget every channel, returning them in order
    pub fn leave_all(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.channels).into_iter().collect()
    }

    /// Joined channels in order
    pub fn channels(&self) -> impl Iterator<Item = &Bytes> {
        self.channels.iter()
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
