//! Per-connection session state
//!
//! A session starts in [`SessionMode::Normal`] and switches to
//! [`SessionMode::SubscribedOnly`] while it has joined at least one channel.

pub mod request;
pub mod state;

pub use request::{CommandError, Request};
pub use state::{SessionMode, SessionState};
