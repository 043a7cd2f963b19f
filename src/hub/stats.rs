//! Hub statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of hub activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Channels with at least one subscriber
    pub channels: usize,
    /// Total (channel, subscriber) memberships
    pub subscriptions: usize,
    /// PUBLISH calls handled
    pub messages_published: u64,
    /// Messages successfully flushed to a subscriber
    pub deliveries: u64,
    /// Deliveries that failed or timed out
    pub failed_deliveries: u64,
}

/// Monotonic counters updated during fan-out
#[derive(Debug, Default)]
pub(super) struct HubCounters {
    pub messages_published: AtomicU64,
    pub deliveries: AtomicU64,
    pub failed_deliveries: AtomicU64,
}

impl HubCounters {
    pub fn snapshot(&self, channels: usize, subscriptions: usize) -> HubStats {
        HubStats {
            channels,
            subscriptions,
            messages_published: self.messages_published.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
        }
    }
}
