//! RESP wire protocol
//!
//! Pure encoding/decoding with no shared state. The session drives
//! [`read_command`] for input and [`write_reply`] for output.

pub mod codec;
pub mod command;
pub mod constants;
pub mod reply;

pub use codec::{read_command, write_frame, write_reply, Decoded};
pub use command::Command;
pub use reply::{encode_command, Reply};
