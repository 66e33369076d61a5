//! Observable session state types.
//!
//! The snapshots published to subscribers and the enums describing where the
//! session currently stands. Subscribers receive clones; nothing here grants
//! mutable access to session internals.

use chorus_proto::{ChatMessage, DirectMessage};

/// Where the session stands in its lifecycle.
///
/// ```text
/// Disconnected ──initialize──> Connecting ──connected──> Connected
///                                                            │ join_room
///                                                            ↓
///                                     Joined <──userJoinedRoom── Joining
///                                        │ leave_room
///                                        ↓
///                                    Connected
/// ```
///
/// `disconnect` returns to `Disconnected` from any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No channel, no identity.
    Disconnected,

    /// Initialization in flight: identity fetch, then channel open and
    /// handshake.
    Connecting,

    /// Channel up and identity cached; not in any room.
    Connected,

    /// Join emitted; waiting for the server to confirm our membership.
    Joining,

    /// Membership confirmed by the server.
    Joined,
}

/// Lifecycle of a history snapshot request.
///
/// One explicit state machine instead of per-feature "requested"/"received"
/// boolean pairs. `Requested` records when the request was issued so an
/// unanswered one can be released by the housekeeping tick instead of
/// wedging the guard until the next room transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryState {
    /// No snapshot requested yet (or the guard was released for retry).
    #[default]
    Unknown,

    /// A request is outstanding; duplicates are suppressed.
    Requested {
        /// When the request was issued, UTC milliseconds.
        since_ms: i64,
    },

    /// The snapshot arrived; no further requests are needed.
    Received,
}

impl HistoryState {
    /// Whether a request is currently outstanding.
    pub fn is_requested(&self) -> bool {
        matches!(self, Self::Requested { .. })
    }

    /// Whether the snapshot has arrived.
    pub fn is_received(&self) -> bool {
        matches!(self, Self::Received)
    }
}

/// Snapshot published to chat subscribers on every room chat change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatState {
    /// The server has confirmed our membership.
    pub joined: bool,

    /// A sent message is still waiting for its echo.
    pub sending: bool,

    /// Chat messages in arrival order.
    pub messages: Vec<ChatMessage>,
}

/// Snapshot published to DM subscribers on every conversation change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DmState {
    /// Presence handshake for the conversation completed.
    pub connected: bool,

    /// Conversation history has been received.
    pub history_received: bool,

    /// Messages sorted ascending by server-assigned index, no duplicates.
    pub messages: Vec<DirectMessage>,
}
