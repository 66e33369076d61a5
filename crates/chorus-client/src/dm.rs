//! Direct-message conversation state.
//!
//! One conversation is active at a time. The server assigns each message a
//! per-conversation index; the local buffer is always sorted ascending by
//! that index and never holds two entries with the same `(sender, index)`
//! pair. A delta may race ahead of a concurrent history fetch, so merging
//! always re-sorts instead of trusting arrival order.

use chorus_proto::{DirectMessage, UserProfile};

use crate::{
    state::{DmState, HistoryState},
    subscription::{SubscriberId, Subscribers, Subscription},
};

/// State of the active conversation, if any.
#[derive(Debug, Default)]
pub(crate) struct DmSession {
    counterpart: Option<UserProfile>,
    messages: Vec<DirectMessage>,
    history: HistoryState,
    connected: bool,
    subscribers: Subscribers<DmState>,
}

impl DmSession {
    /// Open a conversation with `counterpart`, registering the subscriber.
    ///
    /// Entering a new conversation drops the previous one's buffer and
    /// guards.
    pub fn enter(
        &mut self,
        counterpart: UserProfile,
        subscriber: SubscriberId,
    ) -> Subscription<DmState> {
        self.reset();
        self.counterpart = Some(counterpart);
        let subscription = self.subscribers.subscribe(subscriber.clone());
        // Late subscribers catch up from the cached state immediately.
        let state = self.state();
        self.subscribers.publish_to(&subscriber, &state);
        subscription
    }

    /// Close the conversation: clear buffer, subscriber and guards.
    ///
    /// Always safe, including when no conversation is active.
    pub fn leave(&mut self) -> Option<UserProfile> {
        let counterpart = self.counterpart.take();
        self.reset();
        counterpart
    }

    /// The active counterpart, if a conversation is open.
    pub fn counterpart(&self) -> Option<&UserProfile> {
        self.counterpart.as_ref()
    }

    /// Whether a subscriber is registered for the conversation.
    pub fn has_subscriber(&self) -> bool {
        !self.subscribers.is_empty()
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
    ///
    /// Returns `true` if the guard was released.
    pub fn release_stale_history(&mut self, now_ms: i64, timeout_ms: i64) -> bool {
        if let HistoryState::Requested { since_ms } = self.history
            && now_ms.saturating_sub(since_ms) >= timeout_ms
        {
            self.history = HistoryState::Unknown;
            return true;
        }
        false
    }

    /// Presence: mark the conversation transport connected.
    pub fn mark_connected(&mut self) {
        self.connected = true;
        self.publish();
    }

    /// Apply a history snapshot: replace wholesale, sort, dedup, publish.
    ///
    /// Ignored (logged by the caller) when no conversation is active.
    pub fn apply_history(&mut self, history: Vec<DirectMessage>) -> bool {
        if self.counterpart.is_none() {
            return false;
        }

        self.messages = history;
        Self::sort_dedup(&mut self.messages);
        self.history = HistoryState::Received;
        self.publish();
        true
    }

    /// Merge one incoming message, keeping the buffer sorted and
    /// deduplicated.
    pub fn apply_message(&mut self, message: DirectMessage) -> bool {
        if self.counterpart.is_none() {
            return false;
        }

        self.messages.push(message);
        Self::sort_dedup(&mut self.messages);
        self.publish();
        true
    }

    /// Messages sorted ascending by index.
    #[allow(dead_code)]
    pub fn messages(&self) -> &[DirectMessage] {
        &self.messages
    }

    /// Current snapshot for subscribers.
    pub fn state(&self) -> DmState {
        DmState {
            connected: self.connected,
            history_received: self.history.is_received(),
            messages: self.messages.clone(),
        }
    }

    /// Full teardown (session disconnect).
    pub fn clear(&mut self) {
        self.counterpart = None;
        self.reset();
    }

    fn reset(&mut self) {
        self.messages.clear();
        self.history = HistoryState::Unknown;
        self.connected = false;
        self.subscribers.clear();
    }

    fn publish(&mut self) {
        let state = self.state();
        self.subscribers.publish(&state);
    }

    /// Sort ascending by index and drop duplicate `(sender, index)` pairs.
    fn sort_dedup(messages: &mut Vec<DirectMessage>) {
        messages.sort_by(|a, b| {
            a.index.cmp(&b.index).then_with(|| a.sender.user_id.cmp(&b.sender.user_id))
        });
        messages.dedup_by(|a, b| a.index == b.index && a.sender.user_id == b.sender.user_id);
    }
}
