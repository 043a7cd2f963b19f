//! Server replies and their wire encoding
//!
//! Every payload length is computed from the payload itself, so bulk strings
//! may carry CR/LF or arbitrary bytes. A reply is encoded into a single
//! buffer before anything reaches the socket.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::*;

/// A reply sent from the broker to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+text`
    Simple(String),
    /// `-text`
    Error(String),
    /// `:n`
    Integer(i64),
    /// `$len` + payload
    Bulk(Bytes),
    /// `$-1`
    NullBulk,
    /// `*n` + elements
    Array(Vec<Reply>),
}

impl Reply {
    /// `+OK`
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    /// Error reply with the given text
    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// Pub/sub delivery: `["message", channel, payload]`
    pub fn message(channel: Bytes, payload: Bytes) -> Self {
        Reply::Array(vec![
            Reply::Bulk(Bytes::from_static(MESSAGE_KIND.as_bytes())),
            Reply::Bulk(channel),
            Reply::Bulk(payload),
        ])
    }

    /// Subscribe confirmation: `["subscribe", channel, count]`
    pub fn subscribed(channel: Bytes, count: usize) -> Self {
        Self::confirmation(SUBSCRIBE_KIND, channel, count)
    }

    /// Unsubscribe confirmation: `["unsubscribe", channel, count]`
    pub fn unsubscribed(channel: Bytes, count: usize) -> Self {
        Self::confirmation(UNSUBSCRIBE_KIND, channel, count)
    }

    fn confirmation(kind: &'static str, channel: Bytes, count: usize) -> Self {
        Reply::Array(vec![
            Reply::Bulk(Bytes::from_static(kind.as_bytes())),
            Reply::Bulk(channel),
            Reply::Integer(count as i64),
        ])
    }

    /// Append the wire encoding of this reply to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Simple(text) => put_text(buf, SIMPLE_STRING_PREFIX, text),
            Reply::Error(text) => put_text(buf, ERROR_PREFIX, text),
            Reply::Integer(n) => put_line(buf, INTEGER_PREFIX, n.to_string().as_bytes()),
            Reply::Bulk(data) => put_bulk(buf, data),
            Reply::NullBulk => put_line(buf, BULK_PREFIX, NULL_LENGTH.to_string().as_bytes()),
            Reply::Array(items) => {
                put_line(buf, ARRAY_PREFIX, items.len().to_string().as_bytes());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    /// Encode into a standalone buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Encode a client request (`*n` followed by `n` bulk strings)
pub fn encode_command<I, S>(args: I) -> Bytes
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let args: Vec<S> = args.into_iter().collect();
    let mut buf = BytesMut::new();
    put_line(&mut buf, ARRAY_PREFIX, args.len().to_string().as_bytes());
    for arg in &args {
        put_bulk(&mut buf, arg.as_ref());
    }
    buf.freeze()
}

fn put_line(buf: &mut BytesMut, prefix: u8, content: &[u8]) {
    buf.reserve(1 + content.len() + CRLF.len());
    buf.put_u8(prefix);
    buf.put_slice(content);
    buf.put_slice(CRLF);
}

/// Simple strings and errors end at the first CRLF, so any CR or LF in
/// their text is written as a space.
fn put_text(buf: &mut BytesMut, prefix: u8, text: &str) {
    buf.reserve(1 + text.len() + CRLF.len());
    buf.put_u8(prefix);
    buf.extend(
        text.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
    buf.put_slice(CRLF);
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    put_line(buf, BULK_PREFIX, data.len().to_string().as_bytes());
    buf.reserve(data.len() + CRLF.len());
    buf.put_slice(data);
    buf.put_slice(CRLF);
}
