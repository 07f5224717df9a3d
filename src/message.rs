//! Wire messages exchanged between the conversation and its clients.
//!
//! Every message is a `{type, data}` envelope. `data` is sparse: a field that
//! does not apply to a message is absent, never zero, and decoders rely on
//! that distinction.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use thiserror::Error;

/// Stable identity of an authenticated user
pub type UserId = i64;

/// Top-level message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Full snapshot sent to a newly registered client
    Init,
    /// Edit or cursor movement, in either direction
    Update,
    /// Confirms the sender's edit and the version it was stamped with
    Ack,
    UserJoin,
    UserLeave,
}

/// Sub-kind of an `UPDATE` message.
///
/// Unrecognised sub-kinds survive decoding so that validation can reject
/// them explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    Edit,
    Cursor,
    Unknown(String),
}

impl UpdateKind {
    pub fn as_str(&self) -> &str {
        match self {
            UpdateKind::Edit => "EDIT",
            UpdateKind::Cursor => "CURSOR",
            UpdateKind::Unknown(other) => other,
        }
    }
}

impl Serialize for UpdateKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UpdateKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "EDIT" => UpdateKind::Edit,
            "CURSOR" => UpdateKind::Cursor,
            _ => UpdateKind::Unknown(raw),
        })
    }
}

/// Sparse payload of a message; which fields are present depends on the type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<UpdateKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_users: Option<BTreeMap<UserId, i64>>,
}

/// A complete wire message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub data: MessageData,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

impl Message {
    /// Snapshot for a client joining the conversation
    pub fn init(
        version: u64,
        content: impl Into<String>,
        active_users: Option<BTreeMap<UserId, i64>>,
    ) -> Self {
        Self {
            kind: MessageType::Init,
            data: MessageData {
                version: Some(version),
                content: Some(content.into()),
                active_users,
                ..MessageData::default()
            },
        }
    }

    /// Edit carrying a single-hunk patch
    pub fn edit(version: u64, patch: impl Into<String>, cursor_delta: i64) -> Self {
        Self {
            kind: MessageType::Update,
            data: MessageData {
                kind: Some(UpdateKind::Edit),
                version: Some(version),
                patch: Some(patch.into()),
                cursor_delta: Some(cursor_delta),
                ..MessageData::default()
            },
        }
    }

    /// Cursor movement without a document change
    pub fn cursor(cursor_delta: i64) -> Self {
        Self {
            kind: MessageType::Update,
            data: MessageData {
                kind: Some(UpdateKind::Cursor),
                cursor_delta: Some(cursor_delta),
                ..MessageData::default()
            },
        }
    }

    pub fn ack(version: u64) -> Self {
        Self {
            kind: MessageType::Ack,
            data: MessageData {
                version: Some(version),
                ..MessageData::default()
            },
        }
    }

    pub fn user_join(user_id: UserId) -> Self {
        Self::membership(MessageType::UserJoin, user_id)
    }

    pub fn user_leave(user_id: UserId) -> Self {
        Self::membership(MessageType::UserLeave, user_id)
    }

    fn membership(kind: MessageType, user_id: UserId) -> Self {
        Self {
            kind,
            data: MessageData {
                user_id: Some(user_id),
                ..MessageData::default()
            },
        }
    }

    /// Serialize to JSON bytes
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    /// Deserialize from JSON bytes, tolerating surrounding whitespace
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}
