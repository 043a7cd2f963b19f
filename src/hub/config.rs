//! Hub configuration

use std::time::Duration;

/// Configuration for the subscription hub
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Upper bound on a single fan-out delivery (None = wait indefinitely)
    ///
    /// A delivery that exceeds the bound is counted as failed and the
    /// subscriber is marked broken, which tears down its connection.
    pub delivery_timeout: Option<Duration>,
}

impl HubConfig {
    /// Set the per-delivery timeout
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = Some(timeout);
        self
    }
}
