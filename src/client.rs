use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::message::UserId;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one connection, unique for the life of the process.
///
/// A user may hold several connections; membership is keyed by this id,
/// not by [`UserId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Direct write path to a peer, used before the client joins the conversation
pub trait Transport: Send + Sync {
    fn write_message(&mut self, payload: &[u8]) -> io::Result<()>;
}

impl Transport for mpsc::UnboundedSender<Vec<u8>> {
    fn write_message(&mut self, payload: &[u8]) -> io::Result<()> {
        self.send(payload.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "transport closed"))
    }
}

/// Per-connection handle handed to a conversation on registration.
///
/// The conversation is the only producer on the outbound queue. Dropping the
/// handle closes the queue, which tells the connection layer to stop sending.
pub struct Client {
    id: ClientId,
    user_id: UserId,
    outbound: mpsc::Sender<Vec<u8>>,
    transport: Box<dyn Transport>,
}

impl Client {
    /// Create a handle and the receiving end of its outbound queue
    pub fn new(
        user_id: UserId,
        transport: impl Transport + 'static,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let client = Self {
            id: ClientId::next(),
            user_id,
            outbound,
            transport: Box::new(transport),
        };
        (client, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub(crate) fn outbound(&self) -> &mpsc::Sender<Vec<u8>> {
        &self.outbound
    }

    pub(crate) fn write_direct(&mut self, payload: &[u8]) -> io::Result<()> {
        self.transport.write_message(payload)
    }

    /// Close the outbound queue; the handle is not reused afterwards
    pub(crate) fn close(self) {
        drop(self);
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
