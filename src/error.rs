use thiserror::Error;

use crate::message::{CodecError, MessageType, UpdateKind};
use crate::patch::PatchError;

/// A client broke the wire protocol; the offender gets disconnected
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] CodecError),
    #[error("message is of type {0:?}, expected UPDATE")]
    WrongMessageType(MessageType),
    #[error("update is missing required \"type\" field in \"data\"")]
    MissingSubType,
    #[error("update ({}) is missing required fields in \"data\"", .0.as_str())]
    MissingFields(UpdateKind),
    #[error("update has invalid sub-type {0:?}")]
    InvalidSubType(String),
    #[error("update has invalid version number {0}")]
    InvalidVersion(u64),
    #[error("update must contain exactly one patch, found {0}")]
    HunkCount(usize),
    #[error("update carries an unreadable patch: {0}")]
    MalformedPatch(#[from] PatchError),
}

/// Failures seen by callers talking to a conversation
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("conversation {0} has shut down")]
    Closed(i64),
    #[error("transport failed: {0}")]
    Transport(#[from] std::io::Error),
    #[error("peer sent a line longer than {0} bytes")]
    LineTooLong(usize),
}
