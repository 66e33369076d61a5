//! Wire vocabulary
//!
//! Typed payloads for the named-event channel shared by all Chorus clients.
//! The transport carries JSON objects addressed by event name; this crate
//! owns the mapping in both directions:
//!
//! - [`ServerEvent`]: inbound events, decoded and validated at the boundary
//!   via [`ServerEvent::decode`]. The session layer never sees raw JSON.
//! - [`Command`]: outbound events. Each command knows its event name, its
//!   JSON payload, and its delivery class ([`Delivery`]).
//!
//! Field names are bound to the server's wire names with `#[serde(rename)]`,
//! so the Rust structs stay idiomatic while the JSON stays compatible.
//!
//! No I/O lives here; the crate is pure data.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod error;
mod event;
mod types;

pub use command::{Command, Delivery};
pub use error::DecodeError;
pub use event::ServerEvent;
pub use types::{
    ChatEventEnvelope, ChatMessage, ConversationRequest, DirectMessage, DmModifyAction,
    DmModifyRequest, EmojiReaction, PlaybackSignal, QueueEntry, QueueRequest, QueueSnapshot,
    RoomInfo, SongEvent, TimeSyncReply, TimeSyncRequest, TrackInfo, UserProfile, UserRef,
    VoteRecord,
};
