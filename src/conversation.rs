//! The conversation actor.
//!
//! One task owns a document, its version counter and the member set. Clients
//! reach it only through a [`ConversationHandle`], which multiplexes three
//! requests: register, unregister and broadcast. The task handles one request
//! to completion before taking the next, so its state needs no locks.
//!
//! ```text
//! connection ──register/unregister/broadcast──► Conversation ──outbound queue──► connection
//! ```

use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::client::{Client, ClientId, Transport};
use crate::config::{ConversationConfig, DeliveryPolicy};
use crate::error::{ProtocolError, SessionError};
use crate::message::{Message, UserId};
use crate::reconcile::reconcile;
use crate::Document;

pub type ConversationId = i64;

/// Raw bytes from a client's transport and who sent them
#[derive(Debug)]
struct Envelope {
    content: Vec<u8>,
    sender: ClientId,
}

/// A registered client and its tracked cursor position
#[derive(Debug)]
struct Member {
    client: Client,
    position: i64,
}

/// Cloneable entry point to a running conversation.
///
/// The conversation shuts down once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    id: ConversationId,
    outbound_capacity: usize,
    register: mpsc::Sender<Client>,
    unregister: mpsc::Sender<ClientId>,
    broadcast: mpsc::Sender<Envelope>,
}

impl ConversationHandle {
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Build a client sized for this conversation's outbound queues
    pub fn client(
        &self,
        user_id: UserId,
        transport: impl Transport + 'static,
    ) -> (Client, mpsc::Receiver<Vec<u8>>) {
        Client::new(user_id, transport, self.outbound_capacity)
    }

    pub async fn register(&self, client: Client) -> Result<(), SessionError> {
        self.register
            .send(client)
            .await
            .map_err(|_| SessionError::Closed(self.id))
    }

    pub async fn unregister(&self, client: ClientId) -> Result<(), SessionError> {
        self.unregister
            .send(client)
            .await
            .map_err(|_| SessionError::Closed(self.id))
    }

    pub async fn broadcast(&self, content: Vec<u8>, sender: ClientId) -> Result<(), SessionError> {
        self.broadcast
            .send(Envelope { content, sender })
            .await
            .map_err(|_| SessionError::Closed(self.id))
    }
}

/// State owned by the conversation task
pub struct Conversation {
    id: ConversationId,
    document: Document,
    members: HashMap<ClientId, Member>,
    config: ConversationConfig,
    register: mpsc::Receiver<Client>,
    unregister: mpsc::Receiver<ClientId>,
    broadcast: mpsc::Receiver<Envelope>,
}

impl Conversation {
    pub fn new(
        id: ConversationId,
        content: impl Into<String>,
        config: ConversationConfig,
    ) -> (Self, ConversationHandle) {
        let capacity = config.inbox_capacity.max(1);
        let (register_tx, register) = mpsc::channel(capacity);
        let (unregister_tx, unregister) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast) = mpsc::channel(capacity);

        let handle = ConversationHandle {
            id,
            outbound_capacity: config.outbound_capacity,
            register: register_tx,
            unregister: unregister_tx,
            broadcast: broadcast_tx,
        };
        let conversation = Self {
            id,
            document: Document::new(content.into()),
            members: HashMap::new(),
            config,
            register,
            unregister,
            broadcast,
        };
        (conversation, handle)
    }

    /// Create a conversation and run it on its own task.
    ///
    /// The task resolves to the final document once the conversation shuts down.
    pub fn spawn(
        id: ConversationId,
        content: impl Into<String>,
        config: ConversationConfig,
    ) -> (ConversationHandle, JoinHandle<Document>) {
        let (conversation, handle) = Self::new(id, content, config);
        (handle, tokio::spawn(conversation.run()))
    }

    /// Serve requests until the broadcast source closes.
    ///
    /// Clients still registered at shutdown are not notified; their queues
    /// close when the conversation state is dropped.
    pub async fn run(mut self) -> Document {
        loop {
            tokio::select! {
                Some(client) = self.register.recv() => self.register_client(client).await,
                Some(client) = self.unregister.recv() => self.unregister_client(client).await,
                envelope = self.broadcast.recv() => match envelope {
                    Some(envelope) => self.process_broadcast(envelope).await,
                    None => break,
                },
            }
        }

        self.register.close();
        self.unregister.close();
        log::info!("Shutting down conversation {}", self.id);
        self.document
    }

    /// Point-in-time copy of every member's cursor, keyed by user
    fn active_users(&self, exclude: Option<ClientId>) -> Option<BTreeMap<UserId, i64>> {
        let users: BTreeMap<UserId, i64> = self
            .members
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(_, member)| (member.client.user_id(), member.position))
            .collect();
        (!users.is_empty()).then_some(users)
    }

    async fn register_client(&mut self, mut client: Client) {
        let init = Message::init(
            self.document.version,
            self.document.content.clone(),
            self.active_users(None),
        );
        let payload = match init.encode() {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("Failed to encode initial conversation data: {err}");
                client.close();
                return;
            }
        };
        if let Err(err) = client.write_direct(&payload) {
            log::warn!("Failed to send initial conversation data: {err}");
            client.close();
            return;
        }

        let join = match Message::user_join(client.user_id()).encode() {
            Ok(join) => join,
            Err(err) => {
                log::error!("Failed to encode user joining message: {err}");
                client.close();
                return;
            }
        };
        let refused = fan_out(&self.members, self.config.delivery, &join, None).await;

        self.members.insert(client.id(), Member { client, position: 0 });
        log::info!(
            "Registered a client in conversation {} ({} active)",
            self.id,
            self.members.len()
        );

        self.evict(refused).await;
    }

    async fn unregister_client(&mut self, client: ClientId) {
        self.evict(vec![client]).await;
    }

    /// Unregister clients, including any whose queues refuse the resulting notices
    async fn evict(&mut self, mut pending: Vec<ClientId>) {
        while let Some(client) = pending.pop() {
            let refused = self.remove_member(client).await;
            pending.extend(refused);
        }
    }

    async fn remove_member(&mut self, client: ClientId) -> Vec<ClientId> {
        let Some(member) = self.members.remove(&client) else {
            log::debug!(
                "Attempted to unregister an inactive client {client} in conversation {}",
                self.id
            );
            return Vec::new();
        };
        let user_id = member.client.user_id();
        member.client.close();
        log::info!(
            "Unregistered a client in conversation {} ({} active)",
            self.id,
            self.members.len()
        );

        match Message::user_leave(user_id).encode() {
            Ok(leave) => fan_out(&self.members, self.config.delivery, &leave, None).await,
            Err(err) => {
                log::error!("Failed to encode user leaving message: {err}");
                Vec::new()
            }
        }
    }

    async fn process_broadcast(&mut self, envelope: Envelope) {
        let Envelope { content, sender } = envelope;
        let Some(member) = self.members.get(&sender) else {
            log::debug!(
                "Attempted to broadcast from an inactive client {sender} in conversation {}",
                self.id
            );
            return;
        };
        let user_id = member.client.user_id();

        let message = match Message::decode(&content).map_err(ProtocolError::from) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("Disconnecting user {user_id}: {err}");
                self.evict(vec![sender]).await;
                return;
            }
        };

        let patch = message.data.patch.clone();
        let reconciled = match reconcile(&self.document, message) {
            Ok(Some(reconciled)) => reconciled,
            Ok(None) => {
                log::debug!(
                    "Patch {:?} from user {user_id} could not be applied in conversation {}",
                    patch.unwrap_or_default(),
                    self.id
                );
                if self.config.notify_rejected_patches {
                    self.resync(sender).await;
                }
                return;
            }
            Err(err) => {
                log::warn!("Disconnecting user {user_id}: failed to process update: {err}");
                self.evict(vec![sender]).await;
                return;
            }
        };

        let mut message = reconciled.message;
        message.data.user_id = Some(user_id);
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("Failed to encode update message: {err}");
                self.evict(vec![sender]).await;
                return;
            }
        };

        let mut refused = fan_out(&self.members, self.config.delivery, &payload, Some(sender)).await;

        let cursor_delta = message.data.cursor_delta.unwrap_or_default();
        if let Some(member) = self.members.get_mut(&sender) {
            member.position = member.position.saturating_add(cursor_delta);
        }

        if let Some(content) = reconciled.content {
            self.document.commit(content);
            match Message::ack(self.document.version).encode() {
                Ok(ack) => {
                    if !deliver(&self.members, self.config.delivery, sender, ack).await {
                        refused.push(sender);
                    }
                }
                Err(err) => {
                    log::error!("Failed to encode acknowledge message: {err}");
                    refused.push(sender);
                }
            }
        }

        self.evict(refused).await;
    }

    /// Send the current snapshot to a client whose edit was dropped
    async fn resync(&mut self, client: ClientId) {
        let init = Message::init(
            self.document.version,
            self.document.content.clone(),
            self.active_users(Some(client)),
        );
        let delivered = match init.encode() {
            Ok(payload) => deliver(&self.members, self.config.delivery, client, payload).await,
            Err(err) => {
                log::error!("Failed to encode resync snapshot: {err}");
                false
            }
        };
        if !delivered {
            self.evict(vec![client]).await;
        }
    }
}

/// Enqueue on one member's queue; false if it could not take the message
async fn deliver(
    members: &HashMap<ClientId, Member>,
    policy: DeliveryPolicy,
    client: ClientId,
    payload: Vec<u8>,
) -> bool {
    match members.get(&client) {
        Some(member) => enqueue(member, policy, payload).await,
        None => true,
    }
}

/// Enqueue `payload` for every member but `skip`, returning those that refused it
async fn fan_out(
    members: &HashMap<ClientId, Member>,
    policy: DeliveryPolicy,
    payload: &[u8],
    skip: Option<ClientId>,
) -> Vec<ClientId> {
    let mut refused = Vec::new();
    for (id, member) in members {
        if Some(*id) == skip {
            continue;
        }
        if !enqueue(member, policy, payload.to_vec()).await {
            refused.push(*id);
        }
    }
    refused
}

async fn enqueue(member: &Member, policy: DeliveryPolicy, payload: Vec<u8>) -> bool {
    let outbound = member.client.outbound();
    match policy {
        DeliveryPolicy::DisconnectOnFull => match outbound.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "Outbound queue of user {} is full; disconnecting",
                    member.client.user_id()
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        },
        DeliveryPolicy::Block => outbound.send(payload).await.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageType, UpdateKind};
    use crate::patch::make_patch;
    use std::io;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    struct TestClient {
        id: ClientId,
        user_id: UserId,
        direct: mpsc::UnboundedReceiver<Vec<u8>>,
        inbox: mpsc::Receiver<Vec<u8>>,
    }

    impl TestClient {
        /// Register and wait for the INIT snapshot
        async fn join(handle: &ConversationHandle, user_id: UserId, capacity: usize) -> (Self, Message) {
            let (direct_tx, mut direct) = mpsc::unbounded_channel();
            let (client, inbox) = Client::new(user_id, direct_tx, capacity);
            let id = client.id();
            handle.register(client).await.unwrap();

            let init = timeout(WAIT, direct.recv()).await.expect("no init").expect("transport closed");
            let init = Message::decode(&init).unwrap();
            (Self { id, user_id, direct, inbox }, init)
        }

        async fn send(&self, handle: &ConversationHandle, message: &Message) {
            handle.broadcast(message.encode().unwrap(), self.id).await.unwrap();
        }

        async fn next(&mut self) -> Message {
            let raw = timeout(WAIT, self.inbox.recv())
                .await
                .expect("nothing delivered")
                .expect("queue closed");
            Message::decode(&raw).unwrap()
        }

        async fn is_closed(&mut self) -> bool {
            matches!(timeout(WAIT, self.inbox.recv()).await, Ok(None))
        }

        async fn is_quiet(&mut self) -> bool {
            timeout(Duration::from_millis(100), self.inbox.recv()).await.is_err()
        }
    }

    fn spawn(content: &str) -> (ConversationHandle, JoinHandle<Document>) {
        Conversation::spawn(1, content, ConversationConfig::default())
    }

    fn edit(version: u64, from: &str, to: &str, cursor_delta: i64) -> Message {
        Message::edit(version, make_patch(from, to).to_text(), cursor_delta)
    }

    #[tokio::test]
    async fn test_collaboration_scenario() {
        let (handle, task) = spawn("hello");

        let (mut a, init) = TestClient::join(&handle, 1, 16).await;
        assert_eq!(init, Message::init(0, "hello", None));

        let (mut b, init) = TestClient::join(&handle, 2, 16).await;
        assert_eq!(init.kind, MessageType::Init);
        assert_eq!(init.data.version, Some(0));
        assert_eq!(init.data.content.as_deref(), Some("hello"));
        assert_eq!(init.data.active_users, Some(BTreeMap::from([(1, 0)])));
        assert_eq!(a.next().await, Message::user_join(2));

        a.send(&handle, &edit(1, "hello", "hullo", 0)).await;
        let update = b.next().await;
        assert_eq!(update.kind, MessageType::Update);
        assert_eq!(update.data.kind, Some(UpdateKind::Edit));
        assert_eq!(update.data.version, Some(1));
        assert_eq!(update.data.user_id, Some(1));
        assert_eq!(a.next().await, Message::ack(1));

        // Stale version still applies and gets the server's number
        b.send(&handle, &edit(1, "hullo", "hullo!", 1)).await;
        let update = a.next().await;
        assert_eq!(update.data.version, Some(2));
        assert_eq!(update.data.user_id, Some(2));
        assert_eq!(b.next().await, Message::ack(2));

        let (_c, init) = TestClient::join(&handle, 3, 16).await;
        assert_eq!(init.data.version, Some(2));
        assert_eq!(init.data.content.as_deref(), Some("hullo!"));
        assert_eq!(init.data.active_users, Some(BTreeMap::from([(1, 0), (2, 1)])));

        drop(handle);
        let document = task.await.unwrap();
        assert_eq!(document, Document::new_with_version("hullo!".to_string(), 2));
    }

    #[tokio::test]
    async fn test_versions_advance_only_on_edits() {
        let (handle, task) = spawn("a");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;

        let mut text = "a".to_string();
        for expected in 1..=3 {
            let next = format!("{text}{expected}");
            // Client always claims version 7; the server ignores it
            a.send(&handle, &edit(7, &text, &next, 1)).await;
            assert_eq!(a.next().await, Message::ack(expected));
            text = next;

            a.send(&handle, &Message::cursor(-1)).await;
        }
        // Cursor updates produce no ack
        assert!(a.is_quiet().await);

        drop(handle);
        let document = task.await.unwrap();
        assert_eq!(document.content, "a123");
        assert_eq!(document.version, 3);
    }

    #[tokio::test]
    async fn test_no_self_delivery() {
        let (handle, _task) = spawn("hello");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let (mut b, _) = TestClient::join(&handle, 2, 16).await;
        a.next().await; // join of b

        a.send(&handle, &Message::cursor(2)).await;
        let update = b.next().await;
        assert_eq!(update.data.kind, Some(UpdateKind::Cursor));
        assert_eq!(update.data.user_id, Some(a.user_id));
        assert!(a.is_quiet().await);

        a.send(&handle, &edit(1, "hello", "jello", 0)).await;
        let update = b.next().await;
        assert_eq!(update.data.version, Some(1));
        assert_eq!(update.data.user_id, Some(a.user_id));
        assert_ne!(update.data.user_id, Some(b.user_id));
        assert_eq!(a.next().await, Message::ack(1));
        assert!(a.is_quiet().await);
    }

    #[tokio::test]
    async fn test_active_users_snapshot() {
        let (handle, _task) = spawn("hello");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        // Wait on the ack so the move lands before the next registration
        a.send(&handle, &edit(1, "hello", "hello!!!", 3)).await;
        a.next().await;

        let (mut b, init_b) = TestClient::join(&handle, 2, 16).await;
        a.send(&handle, &Message::cursor(2)).await;
        b.next().await;
        let (_c, init_c) = TestClient::join(&handle, 3, 16).await;

        assert_eq!(init_b.data.active_users, Some(BTreeMap::from([(1, 3)])));
        assert_eq!(init_c.data.active_users, Some(BTreeMap::from([(1, 5), (2, 0)])));
    }

    #[tokio::test]
    async fn test_cursor_position_saturates() {
        let (handle, task) = spawn("hello");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let (mut b, _) = TestClient::join(&handle, 2, 16).await;
        a.next().await;

        a.send(&handle, &Message::cursor(i64::MAX)).await;
        a.send(&handle, &Message::cursor(i64::MAX)).await;
        assert_eq!(b.next().await.data.cursor_delta, Some(i64::MAX));
        assert_eq!(b.next().await.data.cursor_delta, Some(i64::MAX));

        let (_c, init) = TestClient::join(&handle, 3, 16).await;
        assert_eq!(init.data.active_users, Some(BTreeMap::from([(1, i64::MAX), (2, 0)])));
        assert!(!task.is_finished());
    }

    #[tokio::test]
    async fn test_wrong_hunk_count_disconnects() {
        let from = "alpha beta gamma delta epsilon zeta eta theta";
        let to = "ALPHA beta gamma delta epsilon zeta eta THETA";
        let (handle, _task) = spawn(from);
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let (mut b, _) = TestClient::join(&handle, 2, 16).await;
        a.next().await;

        a.send(&handle, &edit(1, from, to, 0)).await;
        assert_eq!(b.next().await, Message::user_leave(1));
        assert!(a.is_closed().await);
    }

    #[tokio::test]
    async fn test_unapplied_patch_is_dropped() {
        let (handle, _task) = spawn("hello");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let (mut b, _) = TestClient::join(&handle, 2, 16).await;
        a.next().await;

        a.send(&handle, &edit(1, "abcdefgh", "abcdXefgh", 0)).await;
        a.send(&handle, &Message::cursor(1)).await;

        // Sender is still connected and nothing but the cursor got through
        let update = b.next().await;
        assert_eq!(update.data.kind, Some(UpdateKind::Cursor));
        assert!(a.is_quiet().await);

        let (_c, init) = TestClient::join(&handle, 3, 16).await;
        assert_eq!(init.data.version, Some(0));
        assert_eq!(init.data.content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_rejected_patch_resync() {
        let config = ConversationConfig {
            notify_rejected_patches: true,
            ..ConversationConfig::default()
        };
        let (handle, _task) = Conversation::spawn(1, "hello", config);
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;

        a.send(&handle, &edit(1, "abcdefgh", "abcdXefgh", 0)).await;
        assert_eq!(a.next().await, Message::init(0, "hello", None));
    }

    #[tokio::test]
    async fn test_protocol_violations_disconnect() {
        let (handle, _task) = spawn("hello");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let (mut b, _) = TestClient::join(&handle, 2, 16).await;
        a.next().await;

        handle.broadcast(b"not json".to_vec(), a.id).await.unwrap();
        assert_eq!(b.next().await, Message::user_leave(1));
        assert!(a.is_closed().await);

        let (mut c, _) = TestClient::join(&handle, 3, 16).await;
        assert_eq!(b.next().await, Message::user_join(3));
        c.send(&handle, &Message::ack(1)).await;
        assert_eq!(b.next().await, Message::user_leave(3));
        assert!(c.is_closed().await);

        let (mut d, _) = TestClient::join(&handle, 4, 16).await;
        b.next().await;
        d.send(&handle, &edit(0, "hello", "jello", 0)).await;
        assert_eq!(b.next().await, Message::user_leave(4));
        assert!(d.is_closed().await);
    }

    #[tokio::test]
    async fn test_unregister_notifies_remaining() {
        let (handle, _task) = spawn("hello");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let (mut b, _) = TestClient::join(&handle, 2, 16).await;
        a.next().await;

        handle.unregister(a.id).await.unwrap();
        assert_eq!(b.next().await, Message::user_leave(1));
        assert!(a.is_closed().await);

        // Late duplicate and a broadcast from the departed client are ignored
        handle.unregister(a.id).await.unwrap();
        a.send(&handle, &Message::cursor(1)).await;
        assert!(b.is_quiet().await);
    }

    #[tokio::test]
    async fn test_failed_init_aborts_registration() {
        struct Broken;
        impl Transport for Broken {
            fn write_message(&mut self, _payload: &[u8]) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }

        let (handle, _task) = spawn("hello");
        let (client, mut inbox) = handle.client(9, Broken);
        handle.register(client).await.unwrap();
        assert!(timeout(WAIT, inbox.recv()).await.unwrap().is_none());

        let (_a, init) = TestClient::join(&handle, 1, 16).await;
        assert_eq!(init.data.active_users, None);
    }

    #[tokio::test]
    async fn test_full_queue_disconnects_stalled_client() {
        let (handle, _task) = spawn("hello");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let (mut b, _) = TestClient::join(&handle, 2, 16).await;
        let (mut c, _) = TestClient::join(&handle, 3, 1).await;
        a.next().await;
        a.next().await;
        b.next().await;

        // Fills c's single slot
        a.send(&handle, &Message::cursor(1)).await;
        b.next().await;

        a.send(&handle, &edit(1, "hello", "hullo", 0)).await;
        assert_eq!(b.next().await.data.version, Some(1));
        assert_eq!(b.next().await, Message::user_leave(3));
        assert_eq!(a.next().await, Message::ack(1));
        assert_eq!(a.next().await, Message::user_leave(3));

        assert_eq!(c.next().await.data.kind, Some(UpdateKind::Cursor));
        assert!(c.is_closed().await);
    }

    #[tokio::test]
    async fn test_blocking_delivery_waits_for_stalled_client() {
        let config = ConversationConfig {
            delivery: DeliveryPolicy::Block,
            ..ConversationConfig::default()
        };
        let (handle, task) = Conversation::spawn(1, "hello", config);
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let (mut b, _) = TestClient::join(&handle, 2, 16).await;
        let (mut c, _) = TestClient::join(&handle, 3, 1).await;
        a.next().await;
        a.next().await;
        b.next().await;

        a.send(&handle, &Message::cursor(1)).await;
        b.next().await;

        a.send(&handle, &edit(1, "hello", "hullo", 0)).await;
        // Fan-out cannot finish while c is full, so no ack yet
        assert!(a.is_quiet().await);

        assert_eq!(c.next().await.data.kind, Some(UpdateKind::Cursor));
        assert_eq!(c.next().await.data.version, Some(1));
        assert_eq!(b.next().await.data.version, Some(1));
        assert_eq!(a.next().await, Message::ack(1));

        drop(handle);
        assert_eq!(task.await.unwrap().content, "hullo");
    }

    #[tokio::test]
    async fn test_shutdown_when_handles_dropped() {
        let (handle, task) = spawn("hello");
        let (mut a, _) = TestClient::join(&handle, 1, 16).await;
        let spare = handle.clone();

        drop(handle);
        assert!(!task.is_finished());

        drop(spare);
        let document = task.await.unwrap();
        assert_eq!(document.content, "hello");
        // Abandoned members see their queue end with the conversation
        assert!(a.is_closed().await);
        assert!(a.direct.try_recv().is_err());
    }
}
