/// What a conversation does when a member's outbound queue cannot take a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Never wait: a full or closed queue gets its client disconnected once the
    /// current fan-out has reached everyone else
    #[default]
    DisconnectOnFull,
    /// Wait for room in the queue. A stalled consumer holds up the whole
    /// conversation until it drains.
    Block,
}

/// Conversation settings
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Buffered requests per inbound channel (register, unregister, broadcast)
    pub inbox_capacity: usize,
    /// Outbound queue size for clients created through the conversation handle
    pub outbound_capacity: usize,
    /// Behaviour on a full outbound queue
    pub delivery: DeliveryPolicy,
    /// Send a fresh INIT to a client whose edit failed to apply, instead of
    /// dropping it silently
    pub notify_rejected_patches: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 64,
            outbound_capacity: 256,
            delivery: DeliveryPolicy::default(),
            notify_rejected_patches: false,
        }
    }
}
