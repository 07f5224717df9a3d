use crate::error::ProtocolError;
use crate::message::{Message, MessageType, UpdateKind};
use crate::patch::Patch;
use crate::Document;

/// A validated update, ready to be broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// The update with server-corrected fields
    pub message: Message,
    /// Patched document text, present only for edits
    pub content: Option<String>,
}

/// Validate an incoming update against the current document.
///
/// Returns `Ok(None)` when an edit is well formed but its hunk no longer
/// applies; the caller drops it without penalising the sender. Nothing about
/// the conversation is mutated here.
pub fn reconcile(document: &Document, mut message: Message) -> Result<Option<Reconciled>, ProtocolError> {
    if message.kind != MessageType::Update {
        return Err(ProtocolError::WrongMessageType(message.kind));
    }

    let data = &mut message.data;
    let kind = data.kind.clone().ok_or(ProtocolError::MissingSubType)?;

    let content = match kind {
        UpdateKind::Edit => {
            let (Some(version), Some(patch), Some(_)) =
                (data.version, data.patch.as_deref(), data.cursor_delta)
            else {
                return Err(ProtocolError::MissingFields(UpdateKind::Edit));
            };
            if version < 1 {
                return Err(ProtocolError::InvalidVersion(version));
            }

            let patch = Patch::from_text(patch)?;
            if patch.len() != 1 {
                return Err(ProtocolError::HunkCount(patch.len()));
            }

            let (patched, applied) = patch.apply(&document.content);
            if !applied[0] {
                return Ok(None);
            }

            // The server alone numbers versions
            data.version = Some(document.next_version());
            Some(patched)
        }
        UpdateKind::Cursor => {
            if data.cursor_delta.is_none() {
                return Err(ProtocolError::MissingFields(UpdateKind::Cursor));
            }
            None
        }
        UpdateKind::Unknown(other) => return Err(ProtocolError::InvalidSubType(other)),
    };

    Ok(Some(Reconciled { message, content }))
}
