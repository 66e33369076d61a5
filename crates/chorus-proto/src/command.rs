//! Outbound commands.
//!
//! A [`Command`] is an intent to emit one named event. The session layer
//! builds commands; the driver serializes them with [`Command::payload`] and
//! hands them to the transport under [`Command::name`], honoring the
//! [`Delivery`] class.

use serde::Serialize;
use serde_json::Value;

use crate::{
    error::DecodeError,
    types::{
        ChatEventEnvelope, ConversationRequest, DirectMessage, DmModifyRequest, EmojiReaction,
        PlaybackSignal, QueueRequest, SongEvent, TimeSyncRequest, UserRef,
    },
};

/// Delivery class of an outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued and retried by the transport until delivered.
    Reliable,

    /// May be dropped when the transport is congested or disconnected.
    /// Nothing is lost if it never arrives.
    BestEffort,
}

/// Every event the client can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Identity handshake, sent once the channel opens.
    ConnectUser(UserRef),

    /// Join a room; carries the identity and an empty placeholder message.
    JoinRoom(ChatEventEnvelope),

    /// Leave the current room.
    LeaveRoom(ChatEventEnvelope),

    /// Request the room's chat history snapshot.
    GetLiveChatHistory(ChatEventEnvelope),

    /// Send one live chat message.
    LiveMessage(ChatEventEnvelope),

    /// Open a direct-message conversation.
    EnterDirectMessage(ConversationRequest),

    /// Close the active direct-message conversation.
    ExitDirectMessage(UserRef),

    /// Request the conversation's history snapshot.
    GetDirectMessageHistory(ConversationRequest),

    /// Send one direct message.
    DirectMessage(DirectMessage),

    /// Edit or delete a direct message (one wire event, discriminated
    /// payload).
    ModifyDirectMessage(DmModifyRequest),

    /// Broadcast a transient emoji reaction.
    EmojiReaction(EmojiReaction),

    /// Request a fresh queue snapshot.
    RequestQueue(QueueRequest),

    /// Add a song to the shared queue.
    EnqueueSong(SongEvent),

    /// Remove a song from the shared queue.
    DequeueSong(SongEvent),

    /// Upvote a queued song.
    UpvoteSong(SongEvent),

    /// Downvote a queued song.
    DownvoteSong(SongEvent),

    /// Flip an existing vote.
    SwapSongVote(SongEvent),

    /// Retract an existing vote.
    UndoSongVote(SongEvent),

    /// Ask the server to start room playback.
    InitPlay(PlaybackSignal),

    /// Ask the server to pause room playback.
    InitPause(PlaybackSignal),

    /// Ask the server to stop room playback.
    InitStop(PlaybackSignal),

    /// Round-trip probe; answered by the transport ack (`pong`).
    Ping,

    /// Clock offset exchange; answered by `time_sync_response`.
    TimeSync(TimeSyncRequest),
}

impl Command {
    /// The wire event name this command is emitted under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectUser(_) => "connectUser",
            Self::JoinRoom(_) => "joinRoom",
            Self::LeaveRoom(_) => "leaveRoom",
            Self::GetLiveChatHistory(_) => "getLiveChatHistory",
            Self::LiveMessage(_) => "liveMessage",
            Self::EnterDirectMessage(_) => "enterDirectMessage",
            Self::ExitDirectMessage(_) => "exitDirectMessage",
            Self::GetDirectMessageHistory(_) => "getDirectMessageHistory",
            Self::DirectMessage(_) => "directMessage",
            Self::ModifyDirectMessage(_) => "modifyDirectMessage",
            Self::EmojiReaction(_) => "emojiReaction",
            Self::RequestQueue(_) => "requestQueue",
            Self::EnqueueSong(_) => "enqueueSong",
            Self::DequeueSong(_) => "dequeueSong",
            Self::UpvoteSong(_) => "upvoteSong",
            Self::DownvoteSong(_) => "downvoteSong",
            Self::SwapSongVote(_) => "swapSongVote",
            Self::UndoSongVote(_) => "undoSongVote",
            Self::InitPlay(_) => "initPlay",
            Self::InitPause(_) => "initPause",
            Self::InitStop(_) => "initStop",
            Self::Ping => "ping",
            Self::TimeSync(_) => "time_sync",
        }
    }

    /// Delivery class. Probes and reactions are fire-and-forget; everything
    /// else must arrive.
    pub fn delivery(&self) -> Delivery {
        match self {
            Self::Ping | Self::EmojiReaction(_) => Delivery::BestEffort,
            _ => Delivery::Reliable,
        }
    }

    /// Serialize the payload to the JSON object the transport sends.
    ///
    /// `ping` carries no payload and serializes to `null`.
    pub fn payload(&self) -> Result<Value, DecodeError> {
        match self {
            Self::ConnectUser(p) | Self::ExitDirectMessage(p) => encode(self.name(), p),
            Self::JoinRoom(p)
            | Self::LeaveRoom(p)
            | Self::GetLiveChatHistory(p)
            | Self::LiveMessage(p) => encode(self.name(), p),
            Self::EnterDirectMessage(p) | Self::GetDirectMessageHistory(p) => {
                encode(self.name(), p)
            },
            Self::DirectMessage(p) => encode(self.name(), p),
            Self::ModifyDirectMessage(p) => encode(self.name(), p),
            Self::EmojiReaction(p) => encode(self.name(), p),
            Self::RequestQueue(p) => encode(self.name(), p),
            Self::EnqueueSong(p)
            | Self::DequeueSong(p)
            | Self::UpvoteSong(p)
            | Self::DownvoteSong(p)
            | Self::SwapSongVote(p)
            | Self::UndoSongVote(p) => encode(self.name(), p),
            Self::InitPlay(p) | Self::InitPause(p) | Self::InitStop(p) => encode(self.name(), p),
            Self::Ping => Ok(Value::Null),
            Self::TimeSync(p) => encode(self.name(), p),
        }
    }
}

/// Serialize one payload, attributing failures to the command name.
fn encode<T: Serialize>(event: &'static str, payload: &T) -> Result<Value, DecodeError> {
    serde_json::to_value(payload).map_err(|e| DecodeError::Encode { event, reason: e.to_string() })
}
