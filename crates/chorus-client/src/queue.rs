//! Queue reconciliation.
//!
//! The room's song queue is shared by every viewer. The server is
//! authoritative: `queueState` snapshots replace local state wholesale, and
//! the add/remove/vote deltas are applied on top of the last snapshot.
//! Whatever arrives, the local queue stays sorted ascending by ordinal
//! index, and every change fans out to the registered subscribers.

use chorus_proto::{QueueEntry, QueueSnapshot, RoomInfo, VoteRecord};

use crate::subscription::{SubscriberId, Subscribers, Subscription};

/// Local mirror of the room queue plus its subscriber registry.
#[derive(Debug, Default)]
pub(crate) struct QueueReconciler {
    entries: Vec<QueueEntry>,
    votes: Vec<VoteRecord>,
    subscribers: Subscribers<Vec<QueueEntry>>,
}

impl QueueReconciler {
    /// Register a subscriber for queue snapshots. Re-registering the same id
    /// replaces the previous channel.
    pub fn subscribe(&mut self, id: SubscriberId) -> Subscription<Vec<QueueEntry>> {
        self.subscribers.subscribe(id)
    }

    /// Apply an authoritative snapshot: replace the queue wholesale, sort by
    /// ordinal index, replace the vote set, notify subscribers.
    ///
    /// Returns the room reference carried by the snapshot so the session can
    /// refresh its cache.
    pub fn apply_snapshot(&mut self, snapshot: QueueSnapshot) -> RoomInfo {
        let QueueSnapshot { room, mut songs, votes } = snapshot;
        songs.sort_by_key(|entry| entry.index);
        self.entries = songs;
        self.votes = votes;
        self.publish();
        room
    }

    /// Apply a `songAdded` delta: append and notify.
    ///
    /// No re-sort; the server sends ordinals consistent with current state.
    pub fn apply_added(&mut self, entry: QueueEntry) {
        self.entries.push(entry);
        self.publish();
    }

    /// Apply a `songRemoved` delta: drop the matching entry and notify.
    pub fn apply_removed(&mut self, spotify_id: &str) {
        self.entries.retain(|entry| entry.spotify_id != spotify_id);
        self.publish();
    }

    /// Apply a `voteUpdated` delta: replace the matching entry in place.
    ///
    /// Returns `false` when no entry matches: the song may have been removed
    /// concurrently, so the delta is dropped rather than treated as an error.
    pub fn apply_vote(&mut self, entry: QueueEntry) -> bool {
        let Some(slot) =
            self.entries.iter_mut().find(|candidate| candidate.spotify_id == entry.spotify_id)
        else {
            return false;
        };

        *slot = entry;
        self.publish();
        true
    }

    /// Current queue, sorted ascending by ordinal index (modulo deltas the
    /// server sent out of order on purpose).
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Current vote set, as of the last snapshot.
    pub fn votes(&self) -> &[VoteRecord] {
        &self.votes
    }

    /// Drop queue state and every subscriber (disconnect teardown).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.votes.clear();
        self.subscribers.clear();
    }

    fn publish(&mut self) {
        let snapshot = self.entries.clone();
        self.subscribers.publish(&snapshot);
    }
}
