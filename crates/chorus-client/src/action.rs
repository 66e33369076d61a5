//! Session side effects.
//!
//! The session never performs I/O; it returns [`Action`]s for the driver to
//! execute. Actions are ordered: the driver executes them in the sequence
//! the session returned them.

use chorus_proto::Command;

/// Instructions the session produces for the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Emit a named event over the transport.
    Emit(Command),

    /// Fetch the caller's own profile from the directory, then feed the
    /// result back via [`crate::Session::identity_fetched`].
    FetchSelf,

    /// Fetch room metadata from the directory, then feed the result back via
    /// [`crate::Session::room_fetched`].
    FetchRoom {
        /// Room to look up.
        room_id: String,
    },

    /// Open the persistent event channel, then call
    /// [`crate::Session::channel_opened`].
    OpenChannel,

    /// Close the event channel.
    CloseChannel,

    /// Start playback on the first available output device at the given
    /// offset. No device available downgrades to a logged skip.
    Play {
        /// Track to play.
        track: String,
        /// Clamped seek position, milliseconds into the track.
        offset_ms: u64,
    },

    /// Pause playback on the first available output device.
    Pause,

    /// Surface a one-shot, user-visible notification (external-call
    /// failures during initialization or join).
    Notify {
        /// Human-readable notification text.
        message: String,
    },
}
