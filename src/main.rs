//! iris-broker binary
//!
//! Run with: iris-broker [--bind ADDR] [--port PORT]
//!
//! Try it with redis-cli:
//!   redis-cli -p 6389 SUBSCRIBE news
//!   redis-cli -p 6389 PUBLISH news hello

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use iris_broker::{BrokerServer, HubConfig, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "iris-broker")]
#[command(about = "RESP pub/sub broker")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "IRIS_BROKER_BIND", default_value = "0.0.0.0:6389")]
    bind: SocketAddr,

    /// Override the listen port
    #[arg(short, long, env = "IRIS_BROKER_PORT")]
    port: Option<u16>,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, env = "IRIS_BROKER_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,

    /// Give up on a subscriber after this many milliseconds of blocked delivery
    #[arg(long, env = "IRIS_BROKER_DELIVERY_TIMEOUT_MS")]
    delivery_timeout_ms: Option<u64>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let mut hub = HubConfig::default();
        if let Some(ms) = self.delivery_timeout_ms {
            hub = hub.delivery_timeout(Duration::from_millis(ms));
        }

        let mut config = ServerConfig::with_addr(self.bind)
            .max_connections(self.max_connections)
            .hub(hub);
        if let Some(port) = self.port {
            config = config.port(port);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("iris_broker=info")),
        )
        .init();

    let server = BrokerServer::new(args.server_config());

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Shut down");
    Ok(())
}
