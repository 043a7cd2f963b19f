//! Broker listener
//!
//! Handles the TCP accept loop and spawns one session task per connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

use crate::error::Result;
use crate::hub::Hub;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// How long `run_until` waits for sessions to unwind after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Pub/sub broker server
pub struct BrokerServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    /// Flipped to `true` on shutdown; every session holds a receiver
    shutdown: watch::Sender<bool>,
}

impl BrokerServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let hub = Arc::new(Hub::with_config(config.hub.clone()));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            hub,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            shutdown,
        }
    }

    /// Get a reference to the shared hub
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind and run the server
    ///
    /// This method only returns if binding fails.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Run the server until `shutdown` resolves
    ///
    /// Stops accepting, then tells every running session to close and waits
    /// (up to a grace period) for them to release their subscriptions.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve_until(listener, shutdown).await
    }

    /// Like [`run_until`](Self::run_until) on an already bound listener
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        };

        self.shutdown.send_replace(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, self.shutdown.closed())
            .await
            .is_err()
        {
            tracing::warn!(
                sessions = self.shutdown.receiver_count(),
                "Sessions still running after shutdown grace period"
            );
        }

        result
    }

    /// Run the accept loop on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn bind(&self) -> Result<TcpListener> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Broker listening");
        Ok(listener)
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let hub = Arc::clone(&self.hub);
        let shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let (reader, writer) = socket.into_split();
            let mut connection = Connection::new(session_id, peer_addr, reader, writer, &config, hub)
                .with_shutdown(shutdown);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}
