//! Per-connection session loop
//!
//! Reads one command at a time, dispatches it against the hub, and writes
//! the reply before reading the next command. On exit the connection leaves
//! every channel it joined.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::watch;

use crate::error::Result;
use crate::hub::{Hub, Subscriber};
use crate::protocol::{read_command, Command, Decoded, Reply};
use crate::server::config::ServerConfig;
use crate::session::{Request, SessionState};

/// Best-effort reply sent before dropping a connection on a decode error
const MALFORMED_COMMAND: &str = "ERR malformed command";

/// One client connection
pub struct Connection<R> {
    reader: BufReader<R>,
    subscriber: Arc<Subscriber>,
    state: SessionState,
    hub: Arc<Hub>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<R> Connection<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a connection from the two halves of a stream
    pub fn new<W>(
        session_id: u64,
        peer_addr: SocketAddr,
        reader: R,
        writer: W,
        config: &ServerConfig,
        hub: Arc<Hub>,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: BufReader::with_capacity(config.read_buffer_size, reader),
            subscriber: Arc::new(Subscriber::new(
                session_id,
                peer_addr,
                writer,
                config.write_buffer_size,
            )),
            state: SessionState::new(session_id, peer_addr),
            hub,
            shutdown: None,
        }
    }

    /// End the session once `shutdown` flips to `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run the session until the peer disconnects or the stream fails
    ///
    /// Hub memberships are released on every exit path.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            "Client connected"
        );

        let result = self.process().await;
        self.cleanup().await;

        tracing::info!(
            session_id = self.state.id,
            name = %self.subscriber.display_name(),
            commands = self.state.commands_processed,
            duration_ms = self.state.duration().as_millis() as u64,
            "Client disconnected"
        );

        result
    }

    async fn process(&mut self) -> Result<()> {
        loop {
            let decoded = tokio::select! {
                decoded = read_command(&mut self.reader) => decoded,
                _ = self.subscriber.closed() => {
                    tracing::warn!(
                        session_id = self.state.id,
                        name = %self.subscriber.display_name(),
                        "Stream broken during delivery, closing connection"
                    );
                    return Ok(());
                }
                _ = shutdown_requested(&mut self.shutdown) => {
                    tracing::info!(
                        session_id = self.state.id,
                        name = %self.subscriber.display_name(),
                        "Server shutting down, closing connection"
                    );
                    return Ok(());
                }
            };

            match decoded {
                Ok(Decoded::Command(command)) => self.handle_command(command).await?,
                Ok(Decoded::Null) => continue,
                Ok(Decoded::EndOfStream) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        session_id = self.state.id,
                        name = %self.subscriber.display_name(),
                        error = %e,
                        "Failed to read command"
                    );
                    if !e.is_io() {
                        let _ = self.subscriber.send(&Reply::error(MALFORMED_COMMAND)).await;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        self.state.commands_processed += 1;

        let request = match Request::parse(command, self.state.mode()) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(session_id = self.state.id, error = %e, "Command rejected");
                return self.reply(&e.to_reply()).await;
            }
        };

        tracing::trace!(session_id = self.state.id, ?request, "Command");

        match request {
            Request::Ping => self.reply(&Reply::Simple("PONG".to_string())).await,
            Request::Echo(message) => self.reply(&Reply::Bulk(message)).await,
            Request::Publish { channel, message } => {
                let count = self.hub.publish(&channel, &message).await;
                self.reply(&Reply::Integer(count as i64)).await
            }
            Request::ClientSetName(name) => {
                tracing::info!(
                    session_id = self.state.id,
                    peer = %self.state.peer_addr,
                    name = %String::from_utf8_lossy(&name),
                    "Client name set"
                );
                self.subscriber.set_name(name);
                self.reply(&Reply::ok()).await
            }
            Request::ClientGetName => {
                let reply = match self.subscriber.name() {
                    Some(name) => Reply::Bulk(name),
                    None => Reply::NullBulk,
                };
                self.reply(&reply).await
            }
            Request::Subscribe(channels) => self.subscribe(channels).await,
            Request::Unsubscribe(channels) => self.unsubscribe(channels).await,
        }
    }

    async fn subscribe(&mut self, channels: Vec<Bytes>) -> Result<()> {
        for channel in channels {
            self.hub.subscribe(&channel, &self.subscriber).await;
            let count = self.state.join(channel.clone());
            self.reply(&Reply::subscribed(channel, count)).await?;
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, channels: Vec<Bytes>) -> Result<()> {
        if channels.is_empty() {
            // Leave everything; confirmations carry a count of zero
            let joined: Vec<Bytes> = self.state.channels().cloned().collect();
            for channel in joined {
                self.hub.unsubscribe(&channel, &self.subscriber).await;
                self.state.leave(&channel);
                self.reply(&Reply::unsubscribed(channel, 0)).await?;
            }
            return Ok(());
        }

        for channel in channels {
            let (was_joined, remaining) = self.state.leave(&channel);
            if was_joined {
                self.hub.unsubscribe(&channel, &self.subscriber).await;
            }
            self.reply(&Reply::unsubscribed(channel, remaining)).await?;
        }
        Ok(())
    }

    async fn reply(&self, reply: &Reply) -> Result<()> {
        self.subscriber.send(reply).await?;
        Ok(())
    }

    async fn cleanup(&mut self) {
        let channels = self.state.leave_all();
        if channels.is_empty() {
            return;
        }

        tracing::info!(
            session_id = self.state.id,
            name = %self.subscriber.display_name(),
            channels = channels.len(),
            "Cleaning up subscriptions"
        );

        for channel in &channels {
            self.hub.unsubscribe(channel, &self.subscriber).await;
        }
    }
}

/// Resolves once the server asks sessions to stop. Never resolves without
/// a shutdown signal, or if the server went away without sending one.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        if rx.wait_for(|stop| *stop).await.is_ok() {
            return;
        }
    }
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio_test::io::{Builder, Mock};

    use super::*;
    use crate::error::Error;
    use crate::protocol::encode_command;
    use crate::session::SessionMode;

    fn addr() -> SocketAddr {
        "127.0.0.1:52000".parse().unwrap()
    }

    fn requests(commands: &[&[&str]]) -> Vec<u8> {
        commands
            .iter()
            .flat_map(|args| encode_command(args.iter()).to_vec())
            .collect()
    }

    fn connection(input: &[u8], writer: Mock, hub: &Arc<Hub>) -> Connection<Mock> {
        let reader = Builder::new().read(input).build();
        Connection::new(
            1,
            addr(),
            reader,
            writer,
            &ServerConfig::default(),
            Arc::clone(hub),
        )
    }

    fn outside_subscriber(id: u64, hub_channel: &'static str) -> (Arc<Subscriber>, DuplexStream, Bytes) {
        let (server, client) = tokio::io::duplex(4096);
        let sub = Arc::new(Subscriber::new(id, addr(), server, 1024));
        (sub, client, Bytes::from_static(hub_channel.as_bytes()))
    }

    #[tokio::test]
    async fn test_normal_mode_commands() {
        let hub = Arc::new(Hub::new());
        let input = requests(&[
            &["PING"],
            &["echo", "hello"],
            &["ECHO"],
            &["FOO", "bar"],
            &["PUBLISH", "news"],
        ]);
        let writer = Builder::new()
            .write(b"+PONG\r\n")
            .write(b"$5\r\nhello\r\n")
            .write(b"-ERR ECHO command requires a message\r\n")
            .write(b"-ERR unknown command 'FOO'\r\n")
            .write(b"-ERR PUBLISH command requires channel and message\r\n")
            .build();

        let mut conn = connection(&input, writer, &hub);
        conn.run().await.unwrap();
        assert_eq!(conn.state.commands_processed, 5);
    }

    #[tokio::test]
    async fn test_command_name_with_crlf_yields_one_error_line() {
        let hub = Arc::new(Hub::new());
        let input = requests(&[&["FOO\r\n+OK"], &["PING"]]);
        let writer = Builder::new()
            .write(b"-ERR unknown command 'FOO  +OK'\r\n")
            .write(b"+PONG\r\n")
            .build();

        let mut conn = connection(&input, writer, &hub);
        conn.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_and_null_commands() {
        let hub = Arc::new(Hub::new());
        let writer = Builder::new()
            .write(b"-ERR empty command\r\n")
            .write(b"+PONG\r\n")
            .build();

        let mut conn = connection(b"*0\r\n*-1\r\n*1\r\n$4\r\nPING\r\n", writer, &hub);
        conn.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_client_name() {
        let hub = Arc::new(Hub::new());
        let input = requests(&[
            &["CLIENT", "GETNAME"],
            &["client", "setname", "bob"],
            &["CLIENT", "GETNAME"],
            &["CLIENT"],
            &["CLIENT", "LIST"],
        ]);
        let writer = Builder::new()
            .write(b"$-1\r\n")
            .write(b"+OK\r\n")
            .write(b"$3\r\nbob\r\n")
            .write(b"-ERR CLIENT command requires a subcommand\r\n")
            .write(b"-ERR Unknown CLIENT subcommand 'LIST'\r\n")
            .build();

        let mut conn = connection(&input, writer, &hub);
        conn.run().await.unwrap();
        assert_eq!(conn.subscriber.display_name(), "bob");
    }

    #[tokio::test]
    async fn test_subscribed_mode_lifecycle() {
        let hub = Arc::new(Hub::new());
        let input = requests(&[
            &["SUBSCRIBE", "a", "b"],
            &["PING"],
            &["SUBSCRIBE", "c", "a"],
            &["UNSUBSCRIBE", "a"],
            &["UNSUBSCRIBE", "nope"],
            &["UNSUBSCRIBE"],
            &["PING"],
        ]);
        let writer = Builder::new()
            .write(b"*3\r\n$9\r\nsubscribe\r\n$1\r\na\r\n:1\r\n")
            .write(b"*3\r\n$9\r\nsubscribe\r\n$1\r\nb\r\n:2\r\n")
            .write(b"-ERR only SUBSCRIBE/UNSUBSCRIBE commands are allowed in this mode\r\n")
            .write(b"*3\r\n$9\r\nsubscribe\r\n$1\r\nc\r\n:3\r\n")
            .write(b"*3\r\n$9\r\nsubscribe\r\n$1\r\na\r\n:3\r\n")
            .write(b"*3\r\n$11\r\nunsubscribe\r\n$1\r\na\r\n:2\r\n")
            .write(b"*3\r\n$11\r\nunsubscribe\r\n$4\r\nnope\r\n:2\r\n")
            .write(b"*3\r\n$11\r\nunsubscribe\r\n$1\r\nb\r\n:0\r\n")
            .write(b"*3\r\n$11\r\nunsubscribe\r\n$1\r\nc\r\n:0\r\n")
            .write(b"+PONG\r\n")
            .build();

        let mut conn = connection(&input, writer, &hub);
        conn.run().await.unwrap();

        assert_eq!(conn.state.mode(), SessionMode::Normal);
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_partial_unsubscribe_keeps_mode() {
        let hub = Arc::new(Hub::new());
        let (peer, _client, _) = outside_subscriber(2, "a");
        let input = requests(&[&["SUBSCRIBE", "a", "b"], &["UNSUBSCRIBE", "a"]]);
        let writer = Builder::new()
            .write(b"*3\r\n$9\r\nsubscribe\r\n$1\r\na\r\n:1\r\n")
            .write(b"*3\r\n$9\r\nsubscribe\r\n$1\r\nb\r\n:2\r\n")
            .write(b"*3\r\n$11\r\nunsubscribe\r\n$1\r\na\r\n:1\r\n")
            .build();

        let mut conn = connection(&input, writer, &hub);
        // Drive only the commands, leaving cleanup to be checked separately
        conn.process().await.unwrap();

        assert_eq!(conn.state.mode(), SessionMode::SubscribedOnly);
        assert!(hub.is_subscribed(&Bytes::from_static(b"b"), 1).await);
        assert!(!hub.is_subscribed(&Bytes::from_static(b"a"), 1).await);

        hub.subscribe(&Bytes::from_static(b"b"), &peer).await;
        conn.cleanup().await;
        assert_eq!(hub.subscriber_count(&Bytes::from_static(b"b")).await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_hub() {
        let hub = Arc::new(Hub::new());
        let input = requests(&[&["SUBSCRIBE", "news", "sport"]]);
        let writer = Builder::new()
            .write(b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n")
            .write(b"*3\r\n$9\r\nsubscribe\r\n$5\r\nsport\r\n:2\r\n")
            .build();

        let mut conn = connection(&input, writer, &hub);
        conn.run().await.unwrap();

        assert_eq!(hub.channel_count().await, 0);
        assert_eq!(hub.publish(&Bytes::from_static(b"news"), &Bytes::from_static(b"x")).await, 0);
    }

    #[tokio::test]
    async fn test_publish_reports_delivery_count() {
        let hub = Arc::new(Hub::new());
        let (sub, mut client, news) = outside_subscriber(2, "news");
        hub.subscribe(&news, &sub).await;

        let input = requests(&[&["PUBLISH", "news", "hello"], &["PUBLISH", "empty", "x"]]);
        let writer = Builder::new().write(b":1\r\n").write(b":0\r\n").build();

        let mut conn = connection(&input, writer, &hub);
        conn.run().await.unwrap();

        let expected = b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n";
        let mut buf = vec![0u8; expected.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_malformed_input_closes_connection() {
        let hub = Arc::new(Hub::new());
        let writer = Builder::new()
            .write(b"+PONG\r\n")
            .write(b"-ERR malformed command\r\n")
            .build();

        let mut conn = connection(b"*1\r\n$4\r\nPING\r\n!junk\r\n*1\r\n$4\r\nPING\r\n", writer, &hub);
        let err = conn.run().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_shutdown_signal_ends_session() {
        let hub = Arc::new(Hub::new());
        let (_client, reader) = tokio::io::duplex(64);
        let (stop, stop_rx) = watch::channel(false);
        let mut conn = Connection::new(
            4,
            addr(),
            reader,
            tokio::io::sink(),
            &ServerConfig::default(),
            Arc::clone(&hub),
        )
        .with_shutdown(stop_rx);

        let channel = Bytes::from_static(b"news");
        hub.subscribe(&channel, &conn.subscriber).await;
        conn.state.join(channel.clone());

        stop.send_replace(true);
        conn.run().await.unwrap();

        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_broken_subscriber_ends_session() {
        let hub = Arc::new(Hub::new());
        let (_handle_tx, reader) = tokio::io::duplex(64);
        let mut conn = Connection::new(
            3,
            addr(),
            reader,
            tokio::io::sink(),
            &ServerConfig::default(),
            Arc::clone(&hub),
        );

        let channel = Bytes::from_static(b"news");
        hub.subscribe(&channel, &conn.subscriber).await;
        conn.state.join(channel.clone());

        conn.subscriber.mark_broken();
        conn.run().await.unwrap();

        assert_eq!(hub.subscriber_count(&channel).await, 0);
    }
}
