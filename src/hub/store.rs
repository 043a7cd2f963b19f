//! Subscription hub implementation
//!
//! The process-wide registry of channel memberships. It is the only shared
//! mutable state in the broker.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use super::config::HubConfig;
use super::stats::{HubCounters, HubStats};
use super::subscriber::Subscriber;
use crate::protocol::Reply;

/// Members of one channel, keyed by session ID
type SubscriberSet = HashMap<u64, Arc<Subscriber>>;

/// Channel registry and fan-out engine
///
/// Thread-safe via `RwLock`. Publishes take the read lock only long enough
/// to snapshot a channel's members, then write without holding it, so a
/// stalled subscriber never blocks membership changes or other publishes.
/// Subscribe and unsubscribe take the write lock. Fan-out never mutates the
/// registry, so a failed delivery is only cleaned up when the subscriber's
/// own session unwinds.
pub struct Hub {
    /// Channel name to member set. A key never maps to an empty set.
    channels: RwLock<HashMap<Bytes, SubscriberSet>>,

    config: HubConfig,

    counters: HubCounters,
}

impl Hub {
    /// Create a hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            config,
            counters: HubCounters::default(),
        }
    }

    /// Add `subscriber` to `channel`, creating the channel if needed
    ///
    /// Idempotent: subscribing twice leaves a single membership.
    pub async fn subscribe(&self, channel: &Bytes, subscriber: &Arc<Subscriber>) {
        let mut channels = self.channels.write().await;

        let members = channels.entry(channel.clone()).or_default();
        members.insert(subscriber.id(), Arc::clone(subscriber));

        tracing::info!(
            session_id = subscriber.id(),
            peer = %subscriber.peer_addr(),
            name = %subscriber.display_name(),
            channel = %String::from_utf8_lossy(channel),
            subscribers = members.len(),
            "Subscribed"
        );
    }

    /// Remove `subscriber` from `channel`
    ///
    /// The channel entry is dropped once its last member leaves. Unknown
    /// channels and non-members are ignored.
    pub async fn unsubscribe(&self, channel: &Bytes, subscriber: &Subscriber) {
        let mut channels = self.channels.write().await;

        let Some(members) = channels.get_mut(channel) else {
            return;
        };

        if members.remove(&subscriber.id()).is_none() {
            return;
        }

        let remaining = members.len();
        if remaining == 0 {
            channels.remove(channel);
        }

        tracing::info!(
            session_id = subscriber.id(),
            peer = %subscriber.peer_addr(),
            name = %subscriber.display_name(),
            channel = %String::from_utf8_lossy(channel),
            subscribers = remaining,
            "Unsubscribed"
        );
    }

    /// Deliver `message` to every current member of `channel`
    ///
    /// Returns the number of members in the snapshot taken when the publish
    /// started, not the number of successful deliveries. A failed delivery is
    /// logged, the subscriber is marked broken, and the fan-out continues.
    pub async fn publish(&self, channel: &Bytes, message: &Bytes) -> usize {
        self.counters
            .messages_published
            .fetch_add(1, Ordering::Relaxed);

        // Snapshot the members so no registry lock is held across writes
        let members: Vec<Arc<Subscriber>> = match self.channels.read().await.get(channel) {
            Some(members) => members.values().cloned().collect(),
            None => {
                tracing::debug!(
                    channel = %String::from_utf8_lossy(channel),
                    "Publish to channel without subscribers"
                );
                return 0;
            }
        };

        // Encoded once, shared by every delivery
        let frame = Reply::message(channel.clone(), message.clone()).to_bytes();

        tracing::debug!(
            channel = %String::from_utf8_lossy(channel),
            bytes = message.len(),
            subscribers = members.len(),
            "Publishing"
        );

        for subscriber in &members {
            match self.deliver(subscriber, &frame).await {
                Ok(()) => {
                    self.counters.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters
                        .failed_deliveries
                        .fetch_add(1, Ordering::Relaxed);
                    subscriber.mark_broken();
                    tracing::warn!(
                        session_id = subscriber.id(),
                        peer = %subscriber.peer_addr(),
                        name = %subscriber.display_name(),
                        channel = %String::from_utf8_lossy(channel),
                        error = %e,
                        "Failed to deliver message"
                    );
                }
            }
        }

        members.len()
    }

    async fn deliver(&self, subscriber: &Subscriber, frame: &[u8]) -> std::io::Result<()> {
        match self.config.delivery_timeout {
            Some(limit) => tokio::time::timeout(limit, subscriber.send_frame(frame))
                .await
                .unwrap_or_else(|_| {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "delivery timed out",
                    ))
                }),
            None => subscriber.send_frame(frame).await,
        }
    }

    /// Number of channels with at least one subscriber
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Number of subscribers on `channel`
    pub async fn subscriber_count(&self, channel: &Bytes) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map_or(0, HashMap::len)
    }

    /// Check whether `subscriber_id` is a member of `channel`
    pub async fn is_subscribed(&self, channel: &Bytes, subscriber_id: u64) -> bool {
        self.channels
            .read()
            .await
            .get(channel)
            .is_some_and(|members| members.contains_key(&subscriber_id))
    }

    /// Names of all channels with at least one subscriber
    pub async fn channels(&self) -> Vec<Bytes> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Current statistics
    pub async fn stats(&self) -> HubStats {
        let channels = self.channels.read().await;
        let subscriptions = channels.values().map(HashMap::len).sum();
        self.counters.snapshot(channels.len(), subscriptions)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
