//! Decoded inbound messages and control envelopes.

use super::framing::{Record, MAX_FIELDS};
use super::ProtocolError;
use crate::constants::{
    CONTROL_DO_NOT_SEND, CONTROL_KILL_ALL, CONTROL_MARKER, CONTROL_SET_COLLECTION,
    CONTROL_SET_ORDER, LIST_SEPARATOR,
};
use crate::registry::{Collection, ConnectionId};

/// A record tagged with the connection it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sending effect's name.
    pub name: String,
    /// Payload fields, `None` when absent or empty.
    pub fields: [Option<String>; MAX_FIELDS],
    /// Connection the record arrived on.
    pub origin: ConnectionId,
}

impl Message {
    /// Attach the connection a decoded record arrived on.
    pub fn from_record(record: Record, origin: ConnectionId) -> Self {
        Self {
            name: record.name,
            fields: record.fields,
            origin,
        }
    }

    /// Field by zero-based position.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index)?.as_deref()
    }

    /// Returns true for `NAME:*:...` control envelopes.
    pub fn is_control(&self) -> bool {
        self.field(0) == Some(CONTROL_MARKER)
    }
}

/// Sub-command carried in a control envelope.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    /// `RO`: replace the round order.
    SetOrder(Vec<String>),
    /// `CC`: set (or with no list, detach) the sender's collection.
    SetCollection(Collection),
    /// `DS`: set the sender's do-not-send flag.
    DoNotSend(bool),
    /// `XX`: clear pending choreography and deactivate everything.
    KillAll,
}

impl ControlCommand {
    /// Parse the sub-command of a control envelope (fields 2 and 3).
    pub fn parse(message: &Message) -> Result<Self, ProtocolError> {
        let argument = message.field(2);
        match message.field(1) {
            Some(CONTROL_SET_ORDER) => {
                let list = argument.ok_or(ProtocolError::MissingArgument(CONTROL_SET_ORDER))?;
                Ok(ControlCommand::SetOrder(
                    list.split(LIST_SEPARATOR)
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect(),
                ))
            }
            Some(CONTROL_SET_COLLECTION) => Ok(ControlCommand::SetCollection(
                argument.map(Collection::parse).unwrap_or_default(),
            )),
            Some(CONTROL_DO_NOT_SEND) => match argument {
                Some("1") => Ok(ControlCommand::DoNotSend(true)),
                Some("0") => Ok(ControlCommand::DoNotSend(false)),
                other => Err(ProtocolError::InvalidFlag(other.map(str::to_string))),
            },
            Some(CONTROL_KILL_ALL) => Ok(ControlCommand::KillAll),
            other => Err(ProtocolError::UnknownControl(other.map(str::to_string))),
        }
    }
}
