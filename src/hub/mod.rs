//! Subscription hub for pub/sub routing
//!
//! The hub maps channel names to the set of connections subscribed to them
//! and fans published messages out to those connections.
//!
//! # Architecture
//!
//! ```text
//!                            Arc<Hub>
//!                 ┌──────────────────────────────┐
//!                 │ channels: RwLock<HashMap<    │
//!                 │   channel, { id => Arc<Sub> }│
//!                 │ >>                           │
//!                 └──────────────┬───────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//!   [Publisher]            [Subscriber]            [Subscriber]
//!   PUBLISH ch msg         Mutex<BufWriter>        Mutex<BufWriter>
//!        │                       ▲                       ▲
//!        └──► hub.publish() ─────┴── send_frame() ───────┘
//! ```
//!
//! # Locking
//!
//! Publishes hold the registry read lock only while copying a channel's
//! members out; the writes happen after it is released. Each member's writer
//! sits behind its own mutex, shared with the member's session, so one
//! stream never has two concurrent writers.

pub mod config;
pub mod stats;
pub mod store;
pub mod subscriber;

pub use config::HubConfig;
pub use stats::HubStats;
pub use store::Hub;
pub use subscriber::{ReplyWriter, Subscriber};
