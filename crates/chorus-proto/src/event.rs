//! Inbound events.
//!
//! [`ServerEvent::decode`] is the single entry point from the transport into
//! the typed world: it maps an event name plus raw JSON to a variant, or to a
//! [`DecodeError`] the caller can log and drop without disturbing later
//! events.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::DecodeError,
    types::{
        ChatEventEnvelope, ChatMessage, DirectMessage, EmojiReaction, PlaybackSignal,
        QueueSnapshot, SongEvent, TimeSyncReply, UserRef,
    },
};

/// Every event the server (or the transport adapter) can deliver.
///
/// Variants correspond one-to-one with wire event names; [`ServerEvent::name`]
/// returns the name a variant was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A user joined the current room (possibly us; the session decides).
    UserJoinedRoom(ChatEventEnvelope),

    /// A user left the current room.
    UserLeftRoom(ChatEventEnvelope),

    /// The server acknowledged our `connectUser` handshake.
    Connected(ChatEventEnvelope),

    /// Complete chat history for the current room. Replaces local chat
    /// wholesale.
    LiveChatHistory(Vec<ChatMessage>),

    /// One live chat message, appended in arrival order.
    LiveMessage(ChatEventEnvelope),

    /// Server-reported error. Logged, never retried automatically.
    ServerError(ChatEventEnvelope),

    /// Playback started; carries the shared UTC start instant to seek
    /// against.
    PlayMedia(PlaybackSignal),

    /// Playback paused.
    PauseMedia(PlaybackSignal),

    /// Playback stopped.
    StopMedia(PlaybackSignal),

    /// Reply to `time_sync`; feeds the clock offset estimate.
    TimeSyncResponse(TimeSyncReply),

    /// Transport acknowledgment of an outbound `ping`.
    ///
    /// The wire protocol answers pings through the transport's ack callback;
    /// the adapter surfaces that ack as an event so the clock estimator stays
    /// free of I/O.
    Pong,

    /// One direct message, merged into the ordered conversation buffer.
    DirectMessage(DirectMessage),

    /// Complete conversation history. Replaces the local buffer wholesale.
    DmHistory(Vec<DirectMessage>),

    /// Presence: a user came online.
    UserOnline(UserRef),

    /// Presence: a user went offline.
    UserOffline(UserRef),

    /// Reserved for DM edit/delete notifications. Decoded, never handled.
    ChatModified(Value),

    /// Transient emoji reaction from another viewer.
    EmojiReaction(EmojiReaction),

    /// Authoritative queue snapshot.
    QueueState(QueueSnapshot),

    /// Queue delta: a song was added.
    SongAdded(SongEvent),

    /// Queue delta: a song was removed.
    SongRemoved(SongEvent),

    /// Queue delta: a song's votes changed.
    VoteUpdated(SongEvent),
}

impl ServerEvent {
    /// Decode a named event's JSON payload into a typed variant.
    ///
    /// Unknown names and shape mismatches yield a [`DecodeError`]; the
    /// session layer never sees malformed input.
    pub fn decode(name: &str, payload: &Value) -> Result<Self, DecodeError> {
        match name {
            "userJoinedRoom" => Ok(Self::UserJoinedRoom(parse("userJoinedRoom", payload)?)),
            "userLeftRoom" => Ok(Self::UserLeftRoom(parse("userLeftRoom", payload)?)),
            "connected" => Ok(Self::Connected(parse("connected", payload)?)),
            "liveChatHistory" => Ok(Self::LiveChatHistory(parse("liveChatHistory", payload)?)),
            "liveMessage" => Ok(Self::LiveMessage(parse("liveMessage", payload)?)),
            "error" => Ok(Self::ServerError(parse("error", payload)?)),
            "playMedia" => Ok(Self::PlayMedia(parse("playMedia", payload)?)),
            "pauseMedia" => Ok(Self::PauseMedia(parse("pauseMedia", payload)?)),
            "stopMedia" => Ok(Self::StopMedia(parse("stopMedia", payload)?)),
            "time_sync_response" => {
                Ok(Self::TimeSyncResponse(parse("time_sync_response", payload)?))
            },
            "pong" => Ok(Self::Pong),
            "directMessage" => Ok(Self::DirectMessage(parse("directMessage", payload)?)),
            "dmHistory" => Ok(Self::DmHistory(parse("dmHistory", payload)?)),
            "userOnline" => Ok(Self::UserOnline(parse("userOnline", payload)?)),
            "userOffline" => Ok(Self::UserOffline(parse("userOffline", payload)?)),
            "chatModified" => Ok(Self::ChatModified(payload.clone())),
            "emojiReaction" => Ok(Self::EmojiReaction(parse("emojiReaction", payload)?)),
            "queueState" => Ok(Self::QueueState(parse("queueState", payload)?)),
            "songAdded" => Ok(Self::SongAdded(parse("songAdded", payload)?)),
            "songRemoved" => Ok(Self::SongRemoved(parse("songRemoved", payload)?)),
            "voteUpdated" => Ok(Self::VoteUpdated(parse("voteUpdated", payload)?)),
            other => Err(DecodeError::UnknownEvent { name: other.to_string() }),
        }
    }

    /// The wire name this variant was decoded from.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserJoinedRoom(_) => "userJoinedRoom",
            Self::UserLeftRoom(_) => "userLeftRoom",
            Self::Connected(_) => "connected",
            Self::LiveChatHistory(_) => "liveChatHistory",
            Self::LiveMessage(_) => "liveMessage",
            Self::ServerError(_) => "error",
            Self::PlayMedia(_) => "playMedia",
            Self::PauseMedia(_) => "pauseMedia",
            Self::StopMedia(_) => "stopMedia",
            Self::TimeSyncResponse(_) => "time_sync_response",
            Self::Pong => "pong",
            Self::DirectMessage(_) => "directMessage",
            Self::DmHistory(_) => "dmHistory",
            Self::UserOnline(_) => "userOnline",
            Self::UserOffline(_) => "userOffline",
            Self::ChatModified(_) => "chatModified",
            Self::EmojiReaction(_) => "emojiReaction",
            Self::QueueState(_) => "queueState",
            Self::SongAdded(_) => "songAdded",
            Self::SongRemoved(_) => "songRemoved",
            Self::VoteUpdated(_) => "voteUpdated",
        }
    }
}

/// Decode a payload, attributing failures to the event name.
fn parse<T: DeserializeOwned>(event: &'static str, payload: &Value) -> Result<T, DecodeError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| DecodeError::MalformedPayload { event, reason: e.to_string() })
}
