//! RESP decoding and reply writing
//!
//! ```text
//! *<n>\r\n            array header, n = -1 is a null array
//! $<len>\r\n<bytes>\r\n   bulk string, len = -1 is a null bulk
//! +<text>\r\n         simple string
//! -<text>\r\n         error
//! :<n>\r\n            integer
//! ```
//!
//! Decoding is pull-based over an `AsyncBufRead`: one call consumes exactly
//! one frame. Any error leaves the stream at an unknown position, so callers
//! must drop the connection rather than retry.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::command::Command;
use super::constants::*;
use super::reply::Reply;
use crate::error::ProtocolError;

/// Outcome of reading one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete command
    Command(Command),
    /// A null array (`*-1`), carries no command
    Null,
    /// Peer closed the stream between frames
    EndOfStream,
}

/// Read one frame from `reader`
pub async fn read_command<R>(reader: &mut R) -> Result<Decoded, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let line = match read_line(reader).await? {
        Some(line) => line,
        None => return Ok(Decoded::EndOfStream),
    };

    let (&prefix, content) = line.split_first().ok_or(ProtocolError::EmptyLine)?;

    match prefix {
        ARRAY_PREFIX => {
            let count = parse_length(content, MAX_ARRAY_LENGTH)?;
            if count == NULL_LENGTH {
                return Ok(Decoded::Null);
            }

            let count = count as usize;
            let mut args = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let header = read_line(reader).await?.ok_or(ProtocolError::Truncated)?;
                match header.split_first() {
                    Some((&BULK_PREFIX, len)) => {
                        let len = parse_length(len, MAX_BULK_LENGTH)?;
                        args.push(read_bulk(reader, len).await?);
                    }
                    _ => {
                        return Err(ProtocolError::ExpectedBulkString(
                            String::from_utf8_lossy(&header).into_owned(),
                        ))
                    }
                }
            }
            Ok(Decoded::Command(Command::new(args)))
        }
        BULK_PREFIX => {
            let len = parse_length(content, MAX_BULK_LENGTH)?;
            let data = read_bulk(reader, len).await?;
            Ok(Decoded::Command(Command::new(vec![data])))
        }
        SIMPLE_STRING_PREFIX | INTEGER_PREFIX => Ok(Decoded::Command(Command::new(vec![
            Bytes::copy_from_slice(content),
        ]))),
        ERROR_PREFIX => Err(ProtocolError::ServerError(
            String::from_utf8_lossy(content).into_owned(),
        )),
        other => Err(ProtocolError::UnknownPrefix(char::from(other))),
    }
}

/// Encode `reply` and flush it to `writer` in one go
pub async fn write_reply<W>(writer: &mut W, reply: &Reply) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    reply.encode(&mut buf);
    write_frame(writer, &buf).await
}

/// Write an already-encoded frame and flush
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Read one line without its terminator
///
/// Returns `None` if the stream is already at EOF. A line that ends without
/// a terminator means the peer hung up mid-frame.
async fn read_line<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Ok(None);
    }

    if line.last() != Some(&b'\n') {
        if line.len() > MAX_LINE_LENGTH {
            return Err(ProtocolError::LineTooLong(MAX_LINE_LENGTH));
        }
        return Err(ProtocolError::Truncated);
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    if line.is_empty() {
        return Err(ProtocolError::EmptyLine);
    }

    Ok(Some(line))
}

/// Read a bulk payload of `len` bytes plus its CRLF
///
/// `len == -1` yields an empty argument.
async fn read_bulk<R>(reader: &mut R, len: i64) -> Result<Bytes, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    if len == NULL_LENGTH {
        return Ok(Bytes::new());
    }

    let len = len as usize;
    let mut data = Vec::with_capacity(len.min(MAX_LINE_LENGTH));
    let read = (&mut *reader).take(len as u64).read_to_end(&mut data).await?;
    if read < len {
        return Err(ProtocolError::Truncated);
    }

    let mut terminator = [0u8; 2];
    reader.read_exact(&mut terminator).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::Truncated
        } else {
            ProtocolError::Io(e)
        }
    })?;
    if terminator != CRLF {
        return Err(ProtocolError::MissingTerminator);
    }

    Ok(Bytes::from(data))
}

fn parse_length(content: &[u8], max: i64) -> Result<i64, ProtocolError> {
    let text = std::str::from_utf8(content)
        .map_err(|_| ProtocolError::InvalidLength(String::from_utf8_lossy(content).into_owned()))?;
    let len: i64 = text
        .parse()
        .map_err(|_| ProtocolError::InvalidLength(text.to_string()))?;

    if len < NULL_LENGTH {
        return Err(ProtocolError::InvalidLength(text.to_string()));
    }
    if len > max {
        return Err(ProtocolError::LengthTooLarge(len));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::reply::encode_command;
    use tokio::io::BufReader;
    use tokio_test::io::Builder;

    async fn decode(input: &[u8]) -> Result<Decoded, ProtocolError> {
        let mut builder = Builder::new();
        if !input.is_empty() {
            builder.read(input);
        }
        let mut reader = BufReader::new(builder.build());
        read_command(&mut reader).await
    }

    fn command(parts: &[&str]) -> Decoded {
        Decoded::Command(Command::from_parts(parts.iter()))
    }

    #[tokio::test]
    async fn test_decode_array() {
        let decoded = decode(b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n").await.unwrap();
        assert_eq!(decoded, command(&["ECHO", "hello"]));
    }

    #[tokio::test]
    async fn test_decode_round_trip() {
        let cases: &[&[&str]] = &[
            &["PING"],
            &["PUBLISH", "news", "hello world"],
            &["SUBSCRIBE", "a", "b", "c"],
            &["ECHO", ""],
        ];

        for args in cases {
            let wire = encode_command(args.iter());
            let decoded = decode(&wire).await.unwrap();
            assert_eq!(decoded, command(args));
        }
    }

    #[tokio::test]
    async fn test_decode_binary_safe_payload() {
        let decoded = decode(b"*2\r\n$4\r\nECHO\r\n$6\r\na\r\nb\r\n\r\n").await.unwrap();
        let expected = Command::new(vec![
            Bytes::from_static(b"ECHO"),
            Bytes::from_static(b"a\r\nb\r\n"),
        ]);
        assert_eq!(decoded, Decoded::Command(expected));
    }

    #[tokio::test]
    async fn test_decode_null_array() {
        assert_eq!(decode(b"*-1\r\n").await.unwrap(), Decoded::Null);
    }

    #[tokio::test]
    async fn test_decode_empty_array() {
        let decoded = decode(b"*0\r\n").await.unwrap();
        assert_eq!(decoded, Decoded::Command(Command::default()));
    }

    #[tokio::test]
    async fn test_decode_null_bulk_element() {
        let decoded = decode(b"*2\r\n$4\r\nECHO\r\n$-1\r\n").await.unwrap();
        assert_eq!(decoded, command(&["ECHO", ""]));
    }

    #[tokio::test]
    async fn test_decode_single_bulk() {
        assert_eq!(decode(b"$4\r\nPING\r\n").await.unwrap(), command(&["PING"]));
        assert_eq!(decode(b"$-1\r\n").await.unwrap(), command(&[""]));
    }

    #[tokio::test]
    async fn test_decode_simple_and_integer() {
        assert_eq!(decode(b"+PING\r\n").await.unwrap(), command(&["PING"]));
        assert_eq!(decode(b":42\r\n").await.unwrap(), command(&["42"]));
    }

    #[tokio::test]
    async fn test_decode_error_frame() {
        let err = decode(b"-ERR boom\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::ServerError(ref m) if m == "ERR boom"));
    }

    #[tokio::test]
    async fn test_decode_end_of_stream() {
        assert_eq!(decode(b"").await.unwrap(), Decoded::EndOfStream);
    }

    #[tokio::test]
    async fn test_decode_empty_line() {
        let err = decode(b"\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyLine));
        assert_eq!(err.to_string(), "empty line received");
    }

    #[tokio::test]
    async fn test_decode_unknown_prefix() {
        let err = decode(b"?what\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownPrefix('?')));
    }

    #[tokio::test]
    async fn test_decode_bad_lengths() {
        let err = decode(b"*abc\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength(_)));

        let err = decode(b"$-2\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength(_)));

        let err = decode(b"$999999999999\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::LengthTooLarge(_)));
    }

    #[tokio::test]
    async fn test_decode_expected_bulk() {
        let err = decode(b"*1\r\n+PING\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::ExpectedBulkString(ref s) if s == "+PING"));
    }

    #[tokio::test]
    async fn test_decode_truncated() {
        let err = decode(b"*2\r\n$4\r\nECHO\r\n").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated));

        let err = decode(b"*1\r\n$10\r\nshort").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated));

        let err = decode(b"*1\r\n$4\r\nPI").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated));
    }

    #[tokio::test]
    async fn test_decode_missing_terminator() {
        let err = decode(b"$4\r\nPINGxx").await.unwrap_err();
        assert!(matches!(err, ProtocolError::MissingTerminator));
    }

    #[tokio::test]
    async fn test_decode_consecutive_frames() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n")
            .build();
        let mut reader = BufReader::new(mock);

        assert_eq!(read_command(&mut reader).await.unwrap(), command(&["PING"]));
        assert_eq!(
            read_command(&mut reader).await.unwrap(),
            command(&["ECHO", "hi"])
        );
        assert_eq!(read_command(&mut reader).await.unwrap(), Decoded::EndOfStream);
    }

    #[tokio::test]
    async fn test_write_reply_flushes_whole_frame() {
        let mut writer = Builder::new().write(b"$5\r\nhello\r\n").build();
        write_reply(&mut writer, &Reply::Bulk(Bytes::from_static(b"hello")))
            .await
            .unwrap();
    }
}
