//! iris-broker: RESP pub/sub broker
//!
//! A TCP server speaking a subset of the Redis serialization protocol:
//! `PING`, `ECHO`, `PUBLISH`, `CLIENT SETNAME` / `CLIENT GETNAME`,
//! `SUBSCRIBE` and `UNSUBSCRIBE`.
//!
//! # Example
//!
//! ```no_run
//! use iris_broker::{BrokerServer, ServerConfig};
//!
//! # async fn example() -> iris_broker::error::Result<()> {
//! let server = BrokerServer::new(ServerConfig::default());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::{Error, ProtocolError, Result};
pub use hub::{Hub, HubConfig, HubStats, Subscriber};
pub use protocol::{Command, Reply};
pub use server::{BrokerServer, ServerConfig};
