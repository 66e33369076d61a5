//! Payload types shared by inbound events and outbound commands.
//!
//! All identifiers are opaque strings and all timestamps are UTC milliseconds
//! since the Unix epoch. The structs mirror the server's JSON shapes exactly;
//! where the wire name differs from idiomatic Rust, `#[serde(rename)]` keeps
//! the two in sync.

use serde::{Deserialize, Serialize};

/// A user as the server describes one.
///
/// Fetched once from the directory at initialization and cached as the
/// session identity; also embedded in chat and direct messages as the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Opaque user identifier.
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Login name.
    pub username: String,

    /// Display name. `None` when the user never set one.
    #[serde(rename = "profileName", default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
}

/// Minimal user reference used by handshake and presence payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Opaque user identifier.
    #[serde(rename = "userID")]
    pub user_id: String,
}

/// Room metadata as returned by the room lookup and queue snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Opaque room identifier.
    #[serde(rename = "roomID")]
    pub room_id: String,

    /// The user who created the room. Creators control playback.
    pub creator: UserProfile,

    /// Human-readable room name.
    #[serde(rename = "roomName", default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,

    /// Reference to the room's active queue.
    #[serde(rename = "queueID", default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
}

/// A live chat message in a room.
///
/// Chat carries no sequence number; arrival order is chat order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text.
    #[serde(rename = "messageBody")]
    pub message_body: String,

    /// Sending user.
    pub sender: UserProfile,

    /// Room the message belongs to.
    #[serde(rename = "roomID")]
    pub room_id: String,

    /// Creation time, UTC milliseconds.
    #[serde(rename = "dateCreated")]
    pub date_created: i64,
}

/// Envelope wrapping room chat traffic.
///
/// Used by `joinRoom`, `leaveRoom`, `getLiveChatHistory` and `liveMessage`
/// outbound, and by the membership and `error` events inbound. Join/leave
/// carry an empty placeholder message in `body`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEventEnvelope {
    /// Acting user.
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Message body, when the event carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ChatMessage>,

    /// Server-reported error text, on `error` events only.
    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A direct message between two users.
///
/// `index` is server-assigned, unique per conversation, and is the ordering
/// key: the locally held list is always sorted ascending by index and holds
/// no two entries with the same `(sender, index)` pair. Outbound messages are
/// sent with `index` 0; the server assigns the real one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Server-assigned ordinal within the conversation.
    pub index: u64,

    /// Message text.
    #[serde(rename = "messageBody")]
    pub message_body: String,

    /// Sending user.
    pub sender: UserProfile,

    /// Receiving user.
    pub recipient: UserProfile,

    /// Send time, UTC milliseconds.
    #[serde(rename = "dateSent")]
    pub date_sent: i64,

    /// Read time, UTC milliseconds. Epoch zero when unread.
    #[serde(rename = "dateRead")]
    pub date_read: i64,

    /// Whether the recipient has read the message.
    #[serde(rename = "isRead")]
    pub is_read: bool,

    /// Persistent message id. Empty for locally constructed messages.
    #[serde(rename = "pID", default)]
    pub persistent_id: String,

    /// The message body is a shared room link.
    #[serde(rename = "bodyIsRoomID", default)]
    pub body_is_room_id: bool,
}

/// Request payload naming both sides of a conversation.
///
/// Used by `enterDirectMessage` and `getDirectMessageHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRequest {
    /// Requesting user.
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Conversation counterpart.
    #[serde(rename = "participantID")]
    pub participant_id: String,
}

/// Discriminator for `modifyDirectMessage`.
///
/// Edits and deletes share one wire event; this field tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmModifyAction {
    /// Replace the message body.
    Edit,
    /// Remove the message.
    Delete,
}

/// Payload of `modifyDirectMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmModifyRequest {
    /// Acting user.
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Conversation counterpart.
    #[serde(rename = "participantID")]
    pub participant_id: String,

    /// Edit or delete.
    pub action: DmModifyAction,

    /// The message being modified. For edits the body carries the new text.
    pub message: DirectMessage,
}

/// Track metadata attached to a queue entry.
///
/// Only the fields the client reads are modeled; the server sends more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Track title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Track length in milliseconds. Bounds the computed seek position.
    #[serde(rename = "duration_ms", default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// One entry of a room's shared song queue.
///
/// The locally held queue is always sorted ascending by `index`. Snapshots
/// are authoritative and replace local ordering wholesale; deltas are applied
/// on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Song reference (streaming-platform track id).
    #[serde(rename = "spotifyID")]
    pub spotify_id: String,

    /// User who enqueued the song.
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Aggregate vote score.
    pub score: i64,

    /// Per-queue ordinal. `-1` on locally constructed placeholder entries.
    pub index: i64,

    /// Enqueue time, UTC milliseconds.
    #[serde(rename = "insertTime")]
    pub insert_time: i64,

    /// Declared playback start, UTC milliseconds. Set while playing.
    #[serde(rename = "startTime", default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,

    /// Pause position, milliseconds into the track. Set while paused.
    #[serde(rename = "pauseTime", default, skip_serializing_if = "Option::is_none")]
    pub pause_time: Option<i64>,

    /// Track metadata, when the server has resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackInfo>,
}

/// One user's vote on one queued song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Upvote or downvote.
    #[serde(rename = "isUpvote")]
    pub is_upvote: bool,

    /// Voting user.
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Song the vote applies to.
    #[serde(rename = "spotifyID")]
    pub spotify_id: String,

    /// Vote time, UTC milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// Authoritative queue snapshot carried by `queueState`.
///
/// Fully replaces the local queue and vote set on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// The room the queue belongs to; refreshes the cached room reference.
    pub room: RoomInfo,

    /// Complete queue contents.
    pub songs: Vec<QueueEntry>,

    /// Complete vote set, keyed by song reference.
    pub votes: Vec<VoteRecord>,
}

/// Incremental queue event: one song added, removed, or re-scored.
///
/// Carried by `songAdded`, `songRemoved` and `voteUpdated` inbound, and by
/// the enqueue/dequeue/vote commands outbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongEvent {
    /// The affected entry.
    pub song: QueueEntry,

    /// Room whose queue changed.
    #[serde(rename = "roomID")]
    pub room_id: String,

    /// Event time, UTC milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// Payload of `requestQueue`: ask the server for a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRequest {
    /// Room whose queue is requested.
    #[serde(rename = "roomID")]
    pub room_id: String,

    /// Request time, UTC milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// Playback control signal.
///
/// Outbound on `initPlay`/`initPause`/`initStop` (song and start time unset;
/// the server decides both) and inbound on `playMedia`/`pauseMedia`/
/// `stopMedia` (the server declares what plays and when it started).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSignal {
    /// Acting user.
    #[serde(rename = "userID")]
    pub user_id: String,

    /// Room the signal applies to.
    #[serde(rename = "roomID")]
    pub room_id: String,

    /// Song reference. Always set on inbound `playMedia`.
    #[serde(rename = "spotifyID")]
    pub spotify_id: Option<String>,

    /// Declared playback start, UTC milliseconds. Always set on inbound
    /// `playMedia`; every device seeks relative to this shared instant.
    #[serde(rename = "UTC_time")]
    pub utc_start: Option<i64>,
}

/// Transient emoji reaction. Best-effort delivery; losing one is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiReaction {
    /// Reaction time, UTC milliseconds.
    pub date_created: i64,

    /// The emoji itself.
    pub body: String,

    /// Reacting user.
    #[serde(rename = "userID")]
    pub user_id: String,
}

/// Payload of the outbound `time_sync` exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncRequest {
    /// Local send time, UTC milliseconds.
    pub t0: i64,
}

/// Payload of `time_sync_response`.
///
/// The server echoes `t0` and adds its receipt and reply times, giving the
/// client the three of the four NTP timestamps it does not measure itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncReply {
    /// Client send time, echoed unchanged.
    pub t0: i64,

    /// Server receipt time.
    pub t1: i64,

    /// Server reply time.
    pub t2: i64,
}
