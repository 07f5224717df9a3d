pub mod client;
pub mod config;
pub mod conversation;
pub mod document;
pub mod error;
pub mod message;
pub mod patch;
pub mod reconcile;

#[cfg(feature = "network")]
pub mod network;

pub use client::*;
pub use config::*;
pub use conversation::*;
pub use document::*;
pub use error::*;
pub use message::*;
pub use patch::*;
pub use reconcile::*;

#[cfg(feature = "network")]
pub use network::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_round_trip() {
        let doc = Document::from("Hello world");
        let patch = make_patch(&doc.content, "Hello beautiful world");

        // Client edit -> server reconciliation -> broadcast payload
        let incoming = Message::edit(1, patch.to_text(), 10).encode().unwrap();
        let message = Message::decode(&incoming).unwrap();
        let reconciled = reconcile(&doc, message).unwrap().unwrap();

        assert_eq!(reconciled.content.as_deref(), Some("Hello beautiful world"));
        assert_eq!(reconciled.message.data.version, Some(1));
        assert_eq!(reconciled.message.data.cursor_delta, Some(10));
    }
}
