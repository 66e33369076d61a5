//! External collaborator interfaces.
//!
//! The session computes *what* should happen; these traits are the narrow
//! seams to the systems that make it happen: the REST directory for
//! identity/room lookup, the credential provider for its bearer token, and
//! the media playback driver that actually moves a play-head. None of them
//! are implemented here; the embedding application supplies them.

use async_trait::async_trait;
use chorus_proto::{RoomInfo, UserProfile};
use thiserror::Error;

/// Failures from the directory collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The bearer token was rejected.
    #[error("directory rejected credentials")]
    Unauthorized,

    /// The requested resource does not exist.
    #[error("{resource} not found")]
    NotFound {
        /// What was looked up.
        resource: String,
    },

    /// Transport-level failure talking to the directory.
    #[error("directory unreachable: {reason}")]
    Unreachable {
        /// Underlying diagnostic.
        reason: String,
    },
}

/// Identity and room lookup (`GET /users`, `GET /rooms/{id}`).
///
/// Bearer-token authenticated request/response; the session triggers these
/// through [`crate::Action::FetchSelf`] and [`crate::Action::FetchRoom`].
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetch the calling user's own profile.
    async fn fetch_self(&self, token: &str) -> Result<UserProfile, DirectoryError>;

    /// Fetch metadata for one room.
    async fn fetch_room(&self, token: &str, room_id: &str) -> Result<RoomInfo, DirectoryError>;
}

/// Supplies the bearer token for directory calls.
///
/// Absence of a token means "not ready to initialize", not an error.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The current bearer token, if one is available.
    async fn bearer_token(&self) -> Option<String>;
}

/// Opaque playback output device handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(pub String);

/// Failures from the playback driver.
///
/// Playback failures are reported, never fatal: the session state is already
/// consistent by the time the driver is asked to move a play-head.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The platform rejected the request.
    #[error("playback request rejected: {reason}")]
    Rejected {
        /// Underlying diagnostic.
        reason: String,
    },
}

/// The external media playback driver.
///
/// The session never talks to the streaming platform; it only decides *when*
/// and passes the *offset*.
#[async_trait]
pub trait PlaybackDriver: Send + Sync {
    /// First output device able to play right now, if any.
    async fn first_available_device(&self) -> Option<DeviceId>;

    /// Start `track` on `device` at `offset_ms` into the track.
    async fn play(
        &self,
        device: &DeviceId,
        track: &str,
        offset_ms: u64,
    ) -> Result<(), PlaybackError>;

    /// Pause whatever `device` is playing.
    async fn pause(&self, device: &DeviceId) -> Result<(), PlaybackError>;
}
