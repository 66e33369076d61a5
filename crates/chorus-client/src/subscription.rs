//! Subscriber fan-out.
//!
//! Several UI regions observe the same session state without issuing
//! duplicate network requests: each registers a [`SubscriberId`]-keyed
//! channel and receives cloned snapshots on every change. Registration is
//! explicit and decoupled from any consumer's lifetime (the session outlives
//! UI mounts), and dropping the [`Subscription`] handle is deregistration:
//! closed channels are pruned on the next publish.

use std::collections::HashMap;

use tokio::sync::mpsc;

/// Stable identity of a subscriber.
///
/// Registering the same id twice replaces the previous channel instead of
/// fanning out twice: dedup by key, not by callback identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Create an id. Callers pick stable names ("queue-page", "now-playing").
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// The id this subscription was registered under.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Wait for the next published snapshot. `None` once deregistered.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Non-blocking receive for synchronous call sites and tests.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Drain everything currently buffered and return the most recent
    /// snapshot, if any.
    pub fn latest(&mut self) -> Option<T> {
        let mut latest = None;
        while let Ok(value) = self.receiver.try_recv() {
            latest = Some(value);
        }
        latest
    }
}

/// Registry of subscriber channels for one topic.
#[derive(Debug)]
pub struct Subscribers<T> {
    channels: HashMap<SubscriberId, mpsc::UnboundedSender<T>>,
}

impl<T: Clone> Subscribers<T> {
    /// Empty registry.
    pub fn new() -> Self {
        Self { channels: HashMap::new() }
    }

    /// Register (or re-register) a subscriber and return its handle.
    pub fn subscribe(&mut self, id: SubscriberId) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels.insert(id.clone(), sender);
        Subscription { id, receiver }
    }

    /// Publish a snapshot to every live subscriber, pruning closed channels.
    pub fn publish(&mut self, snapshot: &T) {
        self.channels.retain(|_, sender| sender.send(snapshot.clone()).is_ok());
    }

    /// Send the current snapshot to one subscriber only (late-subscriber
    /// catch-up on registration).
    pub fn publish_to(&mut self, id: &SubscriberId, snapshot: &T) {
        if let Some(sender) = self.channels.get(id)
            && sender.send(snapshot.clone()).is_err()
        {
            self.channels.remove(id);
        }
    }

    /// Drop every registered channel.
    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Number of registered subscribers (including ones whose receiver may
    /// have been dropped but not yet pruned).
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{SubscriberId, Subscribers};

    #[test]
    fn same_id_replaces_instead_of_duplicating() {
        let mut subs: Subscribers<u32> = Subscribers::new();
        let mut first = subs.subscribe(SubscriberId::new("queue-page"));
        let mut second = subs.subscribe(SubscriberId::new("queue-page"));

        assert_eq!(subs.len(), 1);

        subs.publish(&7);
        assert_eq!(first.try_recv(), None);
        assert_eq!(second.try_recv(), Some(7));
    }

    #[test]
    fn publish_reaches_all_subscribers() {
        let mut subs: Subscribers<u32> = Subscribers::new();
        let mut a = subs.subscribe(SubscriberId::new("a"));
        let mut b = subs.subscribe(SubscriberId::new("b"));

        subs.publish(&1);
        assert_eq!(a.try_recv(), Some(1));
        assert_eq!(b.try_recv(), Some(1));
    }

    #[test]
    fn dropped_handles_are_pruned_on_publish() {
        let mut subs: Subscribers<u32> = Subscribers::new();
        let a = subs.subscribe(SubscriberId::new("a"));
        let _b = subs.subscribe(SubscriberId::new("b"));

        drop(a);
        subs.publish(&1);
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn latest_drains_to_most_recent() {
        let mut subs: Subscribers<u32> = Subscribers::new();
        let mut a = subs.subscribe(SubscriberId::new("a"));

        subs.publish(&1);
        subs.publish(&2);
        subs.publish(&3);
        assert_eq!(a.latest(), Some(3));
        assert_eq!(a.latest(), None);
    }
}
