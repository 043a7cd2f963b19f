//! Typed requests
//!
//! Turns a decoded [`Command`] into a [`Request`], enforcing argument counts
//! and the commands permitted in the current [`SessionMode`].

use bytes::Bytes;
use thiserror::Error;

use super::state::SessionMode;
use crate::protocol::{Command, Reply};

/// A validated client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    Echo(Bytes),
    Publish { channel: Bytes, message: Bytes },
    ClientSetName(Bytes),
    ClientGetName,
    Subscribe(Vec<Bytes>),
    /// Empty list means every joined channel
    Unsubscribe(Vec<Bytes>),
}

/// Recoverable command errors, answered with an error reply
///
/// The display text is what goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("ERR empty command")]
    Empty,

    #[error("ERR ECHO command requires a message")]
    EchoMissingMessage,

    #[error("ERR PUBLISH command requires channel and message")]
    PublishArity,

    #[error("ERR CLIENT command requires a subcommand")]
    ClientMissingSubcommand,

    #[error("ERR CLIENT SETNAME requires a name argument")]
    SetNameArity,

    #[error("ERR CLIENT GETNAME does not take arguments")]
    GetNameArity,

    #[error("ERR Unknown CLIENT subcommand '{0}'")]
    UnknownClientSubcommand(String),

    #[error("ERR SUBSCRIBE command requires at least one channel")]
    SubscribeMissingChannel,

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR only SUBSCRIBE/UNSUBSCRIBE commands are allowed in this mode")]
    SubscribedModeOnly,
}

impl CommandError {
    pub fn to_reply(&self) -> Reply {
        Reply::Error(self.to_string())
    }
}

impl Request {
    /// Validate `command` against the session's current mode
    pub fn parse(command: Command, mode: SessionMode) -> Result<Request, CommandError> {
        let name = command.name().ok_or(CommandError::Empty)?;
        let mut args = command.into_args();
        args.remove(0);

        match (mode, name.as_str()) {
            (_, "SUBSCRIBE") => {
                if args.is_empty() {
                    return Err(CommandError::SubscribeMissingChannel);
                }
                Ok(Request::Subscribe(args))
            }
            (SessionMode::SubscribedOnly, "UNSUBSCRIBE") => Ok(Request::Unsubscribe(args)),
            (SessionMode::SubscribedOnly, _) => Err(CommandError::SubscribedModeOnly),

            (SessionMode::Normal, "PING") => Ok(Request::Ping),
            (SessionMode::Normal, "ECHO") => args
                .into_iter()
                .next()
                .map(Request::Echo)
                .ok_or(CommandError::EchoMissingMessage),
            (SessionMode::Normal, "PUBLISH") => {
                let [channel, message]: [Bytes; 2] =
                    args.try_into().map_err(|_| CommandError::PublishArity)?;
                Ok(Request::Publish { channel, message })
            }
            (SessionMode::Normal, "CLIENT") => parse_client(args),
            (SessionMode::Normal, other) => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

fn parse_client(mut args: Vec<Bytes>) -> Result<Request, CommandError> {
    if args.is_empty() {
        return Err(CommandError::ClientMissingSubcommand);
    }
    let subcommand = String::from_utf8_lossy(&args.remove(0)).to_ascii_uppercase();

    match subcommand.as_str() {
        "SETNAME" => {
            let [name]: [Bytes; 1] = args.try_into().map_err(|_| CommandError::SetNameArity)?;
            Ok(Request::ClientSetName(name))
        }
        "GETNAME" if args.is_empty() => Ok(Request::ClientGetName),
        "GETNAME" => Err(CommandError::GetNameArity),
        _ => Err(CommandError::UnknownClientSubcommand(subcommand)),
    }
}
