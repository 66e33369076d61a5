//! Session error types.

use thiserror::Error;

/// Why an operation was skipped.
///
/// Missing preconditions are natural races during setup and teardown, not
/// failures. Callers and tests still deserve to know *which* precondition
/// was missing instead of inferring it from the absence of a side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotReady {
    /// An initialization attempt is already in flight.
    #[error("initialization already in progress")]
    AlreadyConnecting,

    /// The session is already connected.
    #[error("already connected")]
    AlreadyConnected,

    /// No bearer token is available; the session cannot authenticate its
    /// directory lookups.
    #[error("no credentials available")]
    MissingCredentials,

    /// The caller's own identity has not been fetched yet.
    #[error("identity not available")]
    MissingIdentity,

    /// No room reference is cached.
    #[error("no active room")]
    NoActiveRoom,

    /// The operation requires the Joined phase.
    #[error("not joined to a room")]
    NotJoined,

    /// The message body is blank or whitespace-only.
    #[error("message body is blank")]
    BlankMessage,

    /// No direct-message conversation is active.
    #[error("no active conversation")]
    NoConversation,

    /// No subscriber is registered for the active conversation.
    #[error("no subscriber registered")]
    NoSubscriber,

    /// A history request is already outstanding.
    #[error("history request already outstanding")]
    HistoryRequested,

    /// History has already been received for this conversation.
    #[error("history already received")]
    HistoryReceived,
}
