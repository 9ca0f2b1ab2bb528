//! Wire protocol spoken by effects and the button.
//!
//! ASCII records over TCP, terminated by NUL or CR/LF, no length prefix:
//!
//! ```text
//! EFFECT[:FIELD1[:FIELD2[:FIELD3[:FIELD4]]]]\0
//!
//! DRAGON                    announce / keep binding
//! B:1:1                     button 1 pressed
//! ORGAN:*:CC:LULU,BIGBETTY  control envelope: set ORGAN's collection
//! ORGAN:fire                broadcast "fire" to ORGAN's collection
//! LOKI:KA                   keep-alive
//! ```
//!
//! Outgoing traffic is one of three fixed command tokens, or a verbatim
//! broadcast field, always followed by a single NUL byte.
//!
//! See [`framing`] for record extraction, [`message`] for decoded records and
//! [`dispatch`] for routing.

pub mod dispatch;
pub mod framing;
pub mod message;

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{TOKEN_ACTIVATE, TOKEN_DEACTIVATE, TOKEN_STORM};
use crate::registry::ConnectionId;

pub use dispatch::Dispatcher;
pub use framing::{Record, RecordDecoder};
pub use message::{ControlCommand, Message};

/// Recoverable per-record protocol error. Logged and dropped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A partial record grew past the carry limit.
    #[error("record too long: {len} bytes (max {max})")]
    RecordTooLong {
        /// Bytes buffered when the limit was hit.
        len: usize,
        /// Carry limit.
        max: usize,
    },

    /// The record had no effect name before the first separator.
    #[error("record has an empty effect name")]
    EmptyName,

    /// Control envelope with an unrecognised sub-command.
    #[error("unknown control command: {0:?}")]
    UnknownControl(Option<String>),

    /// Control sub-command whose argument is absent.
    #[error("control command {0} is missing its argument")]
    MissingArgument(&'static str),

    /// Boolean field that is neither `0` nor `1`.
    #[error("invalid flag value: {0:?}")]
    InvalidFlag(Option<String>),

    /// Button record whose number or state does not parse.
    #[error("invalid button record: {0}")]
    InvalidButton(String),
}

/// Fixed command understood by every effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectCommand {
    /// Turn on.
    Activate,
    /// Turn off.
    Deactivate,
    /// Run the local storm pattern.
    Storm,
}

impl EffectCommand {
    /// Wire token for this command.
    pub const fn token(self) -> &'static str {
        match self {
            EffectCommand::Activate => TOKEN_ACTIVATE,
            EffectCommand::Deactivate => TOKEN_DEACTIVATE,
            EffectCommand::Storm => TOKEN_STORM,
        }
    }
}

/// Body of an outgoing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// One of the fixed command tokens.
    Command(EffectCommand),
    /// A broadcast field relayed verbatim.
    Text(String),
}

impl Payload {
    /// Payload text without the terminator.
    pub fn as_str(&self) -> &str {
        match self {
            Payload::Command(command) => command.token(),
            Payload::Text(text) => text,
        }
    }

    /// Wire bytes: the payload followed by a NUL terminator.
    pub fn encode(&self) -> Bytes {
        let text = self.as_str().as_bytes();
        let mut buf = BytesMut::with_capacity(text.len() + 1);
        buf.put_slice(text);
        buf.put_u8(0);
        buf.freeze()
    }
}

/// One outgoing record addressed to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Destination connection.
    pub connection: ConnectionId,
    /// What to send.
    pub payload: Payload,
}

impl Delivery {
    /// Deliver a fixed command.
    pub fn command(connection: ConnectionId, command: EffectCommand) -> Self {
        Self {
            connection,
            payload: Payload::Command(command),
        }
    }

    /// Relay text verbatim.
    pub fn text(connection: ConnectionId, text: impl Into<String>) -> Self {
        Self {
            connection,
            payload: Payload::Text(text.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tokens() {
        assert_eq!(EffectCommand::Activate.token(), "$p1%");
        assert_eq!(EffectCommand::Deactivate.token(), "$p0%");
        assert_eq!(EffectCommand::Storm.token(), "$p2%");
    }

    #[test]
    fn test_payload_encode_appends_nul() {
        let cmd = Payload::Command(EffectCommand::Activate).encode();
        assert_eq!(&cmd[..], b"$p1%\0");

        let text = Payload::Text("fire".to_string()).encode();
        assert_eq!(&text[..], b"fire\0");
    }

    #[test]
    fn test_error_messages() {
        let err = ProtocolError::RecordTooLong { len: 3000, max: 2048 };
        assert_eq!(err.to_string(), "record too long: 3000 bytes (max 2048)");
        assert_eq!(
            ProtocolError::MissingArgument("RO").to_string(),
            "control command RO is missing its argument"
        );
    }
}
