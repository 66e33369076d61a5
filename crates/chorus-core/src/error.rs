//! Error types for clock machinery.

use thiserror::Error;

/// Errors from the clock synchronization state machine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// A probe is already waiting for its reply; a second one would
    /// accumulate unanswered probes on a slow network.
    #[error("a latency probe sent at {sent_at_ms} is still outstanding")]
    ProbeInFlight {
        /// When the outstanding probe was sent, UTC milliseconds.
        sent_at_ms: i64,
    },
}
