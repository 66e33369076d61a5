//! Session
//!
//! The live room synchronization client: one long-lived [`Session`] turns the
//! unordered, occasionally-duplicated stream of server events into consistent
//! local state (room chat, the shared votable queue, direct-message threads)
//! and computes clock-skew-compensated seek positions so independent devices
//! start audio at the same real-world instant.
//!
//! # Architecture
//!
//! The session is a pure, single-threaded state machine. Operations
//! ([`Session::join_room`], [`Session::send_dm`], ...) and inbound events
//! ([`Session::handle`]) mutate local state and return [`Action`]s; a
//! [`SessionDriver`] executes those actions against the external
//! collaborators ([`EventTransport`], [`Directory`], [`CredentialProvider`],
//! [`PlaybackDriver`]). No locks guard session state: every handler runs to
//! completion before the next event is processed.
//!
//! Operations that cannot run return [`NotReady`] naming the missing
//! precondition; inbound events that arrive at the wrong moment are logged
//! and dropped, because setup/teardown races are normal, not failures.
//!
//! # Components
//!
//! - [`Session`]: connection lifecycle, room membership, chat, playback
//! - [`Subscription`]: fan-out handles for chat/queue/DM state snapshots
//! - [`SessionDriver`]: async loop wiring a transport to the state machine

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod config;
mod dm;
mod driver;
mod error;
mod external;
mod queue;
mod room;
mod session;
mod state;
mod subscription;

pub use action::Action;
pub use chorus_core::{Clock, ClockEstimate, SystemClock, clock::test_utils};
pub use config::SessionConfig;
pub use driver::{DriverError, EventTransport, SessionDriver};
pub use error::NotReady;
pub use external::{
    CredentialProvider, DeviceId, Directory, DirectoryError, PlaybackDriver, PlaybackError,
};
pub use session::Session;
pub use state::{ChatState, DmState, HistoryState, SessionPhase};
pub use subscription::{SubscriberId, Subscription};
