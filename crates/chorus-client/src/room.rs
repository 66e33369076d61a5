//! Room session state.
//!
//! Chat for the current room plus the membership and history bookkeeping
//! around it. Chat carries no sequence numbers: history replaces the list
//! wholesale and live messages append in arrival order.

use chorus_proto::{ChatMessage, EmojiReaction, RoomInfo};

use crate::{
    state::{ChatState, HistoryState},
    subscription::{SubscriberId, Subscribers, Subscription},
};

/// Current room, chat buffer, and the guards protecting them.
#[derive(Debug, Default)]
pub(crate) struct RoomSession {
    current: Option<RoomInfo>,
    joined: bool,
    chat: Vec<ChatMessage>,
    history: HistoryState,
    sending: bool,
    subscribers: Subscribers<ChatState>,
    reactions: Subscribers<EmojiReaction>,
}

impl RoomSession {
    /// The cached room reference, if one is set.
    pub fn current(&self) -> Option<&RoomInfo> {
        self.current.as_ref()
    }

    /// Cache a freshly fetched room reference.
    pub fn set_current(&mut self, room: RoomInfo) {
        self.current = Some(room);
    }

    /// Refresh the cached reference from an authoritative snapshot, keeping
    /// it only when a room is actually cached (stale broadcasts after a
    /// leave must not resurrect the reference).
    pub fn refresh_current(&mut self, room: RoomInfo) {
        if self.current.is_some() {
            self.current = Some(room);
        }
    }

    /// Whether the server has confirmed our membership.
    #[allow(dead_code)]
    pub fn joined(&self) -> bool {
        self.joined
    }

    /// Mark membership confirmed and notify chat subscribers.
    pub fn mark_joined(&mut self) {
        self.joined = true;
        self.publish();
    }

    /// History request guard.
    pub fn history(&self) -> HistoryState {
        self.history
    }

    /// Mark a history request as issued at `now_ms`.
    pub fn mark_history_requested(&mut self, now_ms: i64) {
        self.history = HistoryState::Requested { since_ms: now_ms };
    }

    /// Release a `Requested` guard older than `timeout_ms`, allowing retry.
    pub fn release_stale_history(&mut self, now_ms: i64, timeout_ms: i64) -> bool {
        if let HistoryState::Requested { since_ms } = self.history
            && now_ms.saturating_sub(since_ms) >= timeout_ms
        {
            self.history = HistoryState::Unknown;
            return true;
        }
        false
    }

    /// A live message was emitted and is waiting for its echo.
    pub fn mark_sending(&mut self) {
        self.sending = true;
        self.publish();
    }

    /// Whether a sent message is still waiting for its echo.
    #[allow(dead_code)]
    pub fn sending(&self) -> bool {
        self.sending
    }

    /// Replace chat wholesale from a history snapshot.
    pub fn apply_history(&mut self, history: Vec<ChatMessage>) {
        self.chat = history;
        self.history = HistoryState::Received;
        self.publish();
    }

    /// Append one live message in arrival order.
    ///
    /// `is_own_echo` clears the sending flag: the server reflected our
    /// message back, so the send completed.
    pub fn apply_message(&mut self, message: ChatMessage, is_own_echo: bool) {
        if is_own_echo {
            self.sending = false;
        }
        self.chat.push(message);
        self.publish();
    }

    /// Chat messages in arrival order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.chat
    }

    /// Register a chat subscriber; it immediately receives the cached state.
    pub fn subscribe(&mut self, id: SubscriberId) -> Subscription<ChatState> {
        let subscription = self.subscribers.subscribe(id.clone());
        let state = self.state();
        self.subscribers.publish_to(&id, &state);
        subscription
    }

    /// Register a subscriber for transient emoji reactions.
    pub fn subscribe_reactions(&mut self, id: SubscriberId) -> Subscription<EmojiReaction> {
        self.reactions.subscribe(id)
    }

    /// Fan a reaction out to reaction subscribers.
    pub fn publish_reaction(&mut self, reaction: &EmojiReaction) {
        self.reactions.publish(reaction);
    }

    /// Leave teardown: clear chat, guards and the cached reference, keep
    /// subscribers (the UI survives room transitions).
    pub fn leave(&mut self) {
        self.current = None;
        self.joined = false;
        self.chat.clear();
        self.history = HistoryState::Unknown;
        self.sending = false;
        self.publish();
    }

    /// Disconnect teardown: leave plus subscriber deregistration.
    pub fn clear(&mut self) {
        self.leave();
        self.subscribers.clear();
        self.reactions.clear();
    }

    /// Current snapshot for subscribers.
    pub fn state(&self) -> ChatState {
        ChatState { joined: self.joined, sending: self.sending, messages: self.chat.clone() }
    }

    fn publish(&mut self) {
        let state = self.state();
        self.subscribers.publish(&state);
    }
}
