//! Session configuration.

use std::time::Duration;

use chorus_core::DEFAULT_PROBE_TIMEOUT;

/// How long a chat or DM history request may stay unanswered before its
/// guard releases and a retry is allowed.
pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval at which the driver feeds housekeeping ticks to the session.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Tunables for a [`crate::Session`] and its driver.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the live server the transport connects to.
    pub server_url: String,

    /// Latency probe guard release (see [`chorus_core::ClockSync`]).
    pub probe_timeout: Duration,

    /// History request guard release for live chat and DM fetches.
    pub history_timeout: Duration,

    /// Driver housekeeping tick interval.
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            history_timeout: DEFAULT_HISTORY_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}
