//! Decoded client command

use bytes::Bytes;

/// One request from a client: an ordered list of binary-safe arguments
///
/// The first argument is the command name. A command with no arguments at
/// all is representable (a `*0` array) but is rejected by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Create a command from its arguments
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// Build a command from string-like parts
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            args: parts
                .into_iter()
                .map(|p| Bytes::copy_from_slice(p.as_ref()))
                .collect(),
        }
    }

    /// Command name, uppercased. `None` for an empty command.
    pub fn name(&self) -> Option<String> {
        self.args
            .first()
            .map(|n| String::from_utf8_lossy(n).to_ascii_uppercase())
    }

    /// All arguments, including the name
    pub fn into_args(self) -> Vec<Bytes> {
        self.args
    }
}
