//! Error types
//!
//! `ProtocolError` covers everything that makes an incoming frame undecodable.
//! Those errors are fatal to the connection that produced them. Validation
//! failures of well-formed commands live in [`crate::session::CommandError`]
//! and are answered on the wire instead.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or stream failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer sent something that is not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid server configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Fatal decode errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty line received")]
    EmptyLine,

    #[error("unknown RESP prefix: {0:?}")]
    UnknownPrefix(char),

    #[error("invalid length: {0:?}")]
    InvalidLength(String),

    #[error("length {0} exceeds limit")]
    LengthTooLarge(i64),

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("expected bulk string, got {0:?}")]
    ExpectedBulkString(String),

    /// Bulk payload was not followed by CRLF
    #[error("bulk string not terminated by CRLF")]
    MissingTerminator,

    /// Stream ended in the middle of a frame
    #[error("stream ended mid-frame")]
    Truncated,

    /// Peer sent an error frame (`-...`)
    #[error("server error: {0}")]
    ServerError(String),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True if the error came from the transport rather than the frame content
    pub fn is_io(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}
