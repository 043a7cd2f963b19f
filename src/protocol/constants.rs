//! RESP wire constants

/// Simple string prefix (`+OK`)
pub const SIMPLE_STRING_PREFIX: u8 = b'+';

/// Error prefix (`-ERR ...`)
pub const ERROR_PREFIX: u8 = b'-';

/// Integer prefix (`:42`)
pub const INTEGER_PREFIX: u8 = b':';

/// Bulk string prefix (`$5`)
pub const BULK_PREFIX: u8 = b'$';

/// Array prefix (`*3`)
pub const ARRAY_PREFIX: u8 = b'*';

/// Line terminator
pub const CRLF: &[u8] = b"\r\n";

/// Length value marking a null bulk string or null array
pub const NULL_LENGTH: i64 = -1;

/// Largest bulk string accepted from a peer (512 MiB)
pub const MAX_BULK_LENGTH: i64 = 512 * 1024 * 1024;

/// Largest array element count accepted from a peer
pub const MAX_ARRAY_LENGTH: i64 = 1024 * 1024;

/// Longest header or inline line accepted from a peer
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default broker port
pub const DEFAULT_PORT: u16 = 6389;

/// Kind tag of a pub/sub delivery array
pub const MESSAGE_KIND: &str = "message";

/// Kind tag of a subscribe confirmation
pub const SUBSCRIBE_KIND: &str = "subscribe";

/// Kind tag of an unsubscribe confirmation
pub const UNSUBSCRIBE_KIND: &str = "unsubscribe";
