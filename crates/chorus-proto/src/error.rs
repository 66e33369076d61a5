//! Boundary errors.
//!
//! The server's payload shapes are not trusted: every inbound event is
//! decoded into a typed value before the session sees it, and a mismatch
//! surfaces here instead of deep inside a handler.

use thiserror::Error;

/// Errors produced while translating between JSON and typed payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The event name is not part of the protocol.
    #[error("unknown event: {name}")]
    UnknownEvent {
        /// The unrecognized name as delivered by the transport.
        name: String,
    },

    /// The payload did not match the shape the event name implies.
    #[error("malformed payload for {event}: {reason}")]
    MalformedPayload {
        /// Event whose payload failed to decode.
        event: &'static str,
        /// Decoder diagnostic.
        reason: String,
    },

    /// An outbound payload could not be serialized.
    #[error("failed to encode payload for {event}: {reason}")]
    Encode {
        /// Command whose payload failed to serialize.
        event: &'static str,
        /// Serializer diagnostic.
        reason: String,
    },
}
