//! Clock synchronization estimator.
//!
//! Two independent exchanges against the server, both driven by the caller:
//!
//! - **Latency probe**: record the send instant, emit a ping, and measure the
//!   round trip when the ack comes back. One probe may be in flight at a
//!   time.
//! - **Offset exchange**: send local time `t0`; the server echoes it with its
//!   receipt time `t1` and reply time `t2`. With local receipt time `t3`, the
//!   offset is `((t1 - t0) + (t2 - t3)) / 2`, the classic symmetric-latency
//!   NTP approximation.
//!
//! Both cells keep their last good value: a lost or timed-out sample never
//! resets the estimate to zero, it just leaves the previous one in place.

use std::time::Duration;

use crate::error::ClockError;

/// How long a probe may wait for its ack before the guard is released and a
/// fresh probe is allowed.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Current latency/offset estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockEstimate {
    /// Round-trip time of the last completed probe. `None` until one
    /// completes.
    pub rtt: Option<Duration>,

    /// Estimated server-minus-local clock offset in milliseconds. Zero until
    /// the first offset exchange completes.
    pub offset_ms: i64,
}

/// Latency and wall-clock offset estimation state machine.
#[derive(Debug, Clone)]
pub struct ClockSync {
    /// Send instant of the outstanding probe. `None` when no probe is in
    /// flight.
    probe_sent_at: Option<i64>,

    /// Guard release deadline for a lost probe ack.
    probe_timeout: Duration,

    estimate: ClockEstimate,
}

impl ClockSync {
    /// Create an estimator with the given probe timeout.
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_sent_at: None, probe_timeout, estimate: ClockEstimate::default() }
    }

    /// Whether a probe is waiting for its ack.
    pub fn probe_in_flight(&self) -> bool {
        self.probe_sent_at.is_some()
    }

    /// Start a latency probe at `now_ms`. The caller emits the ping.
    ///
    /// Refuses while a previous probe is outstanding so unanswered probes
    /// cannot accumulate on a slow network.
    pub fn begin_probe(&mut self, now_ms: i64) -> Result<(), ClockError> {
        if let Some(sent_at_ms) = self.probe_sent_at {
            return Err(ClockError::ProbeInFlight { sent_at_ms });
        }

        self.probe_sent_at = Some(now_ms);
        Ok(())
    }

    /// Complete the outstanding probe with the ack's arrival time.
    ///
    /// An ack with no outstanding probe is ignored; a duplicate or stale ack
    /// must not overwrite the estimate.
    pub fn complete_probe(&mut self, now_ms: i64) {
        if let Some(sent_at) = self.probe_sent_at.take() {
            let elapsed = now_ms.saturating_sub(sent_at).max(0);
            self.estimate.rtt = Some(Duration::from_millis(elapsed as u64));
        }
    }

    /// Start an offset exchange; returns the `t0` to send to the server.
    ///
    /// No guard applies: replies are self-describing because the server
    /// echoes `t0` back.
    pub fn begin_offset_exchange(&self, now_ms: i64) -> i64 {
        now_ms
    }

    /// Complete an offset exchange from the server's reply.
    ///
    /// `t0` is the echoed send time, `t1`/`t2` the server's receipt and reply
    /// times, and `now_ms` is `t3`, the local arrival time.
    pub fn complete_offset_exchange(&mut self, t0: i64, t1: i64, t2: i64, now_ms: i64) {
        let t3 = now_ms;
        self.estimate.offset_ms = ((t1 - t0) + (t2 - t3)) / 2;
    }

    /// Release a probe guard whose ack never arrived.
    ///
    /// Without this, one lost ack would block probing until reconnect. The
    /// stale sample is discarded; the previous estimate stays.
    pub fn tick(&mut self, now_ms: i64) {
        if let Some(sent_at) = self.probe_sent_at {
            let waited = now_ms.saturating_sub(sent_at).max(0) as u64;
            if waited >= self.probe_timeout.as_millis() as u64 {
                self.probe_sent_at = None;
            }
        }
    }

    /// Current estimate. Never reset by failures.
    pub fn estimate(&self) -> ClockEstimate {
        self.estimate
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn offset_formula_worked_example() {
        // t0=1000, t1=1050, t2=1060, t3=1120 => ((50) + (-60)) / 2 = -5
        let mut sync = ClockSync::default();
        sync.complete_offset_exchange(1000, 1050, 1060, 1120);
        assert_eq!(sync.estimate().offset_ms, -5);
    }

    #[test]
    fn offset_recovers_skew_under_symmetric_latency() {
        // Server runs 15ms ahead; 50ms each way.
        let mut sync = ClockSync::default();
        let t0 = 1000;
        let t1 = t0 + 50 + 15;
        let t2 = t1 + 10;
        let t3 = t0 + 50 + 10 + 50;
        sync.complete_offset_exchange(t0, t1, t2, t3);
        assert_eq!(sync.estimate().offset_ms, 15);
    }

    #[test]
    fn second_probe_refused_while_outstanding() {
        let mut sync = ClockSync::default();
        sync.begin_probe(100).unwrap();

        let result = sync.begin_probe(200);
        assert_eq!(result, Err(ClockError::ProbeInFlight { sent_at_ms: 100 }));
    }

    #[test]
    fn probe_round_trip_measured_from_send() {
        let mut sync = ClockSync::default();
        sync.begin_probe(100).unwrap();
        sync.complete_probe(175);

        assert_eq!(sync.estimate().rtt, Some(Duration::from_millis(75)));
        assert!(!sync.probe_in_flight());
    }

    #[test]
    fn unsolicited_ack_is_ignored() {
        let mut sync = ClockSync::default();
        sync.complete_probe(500);
        assert_eq!(sync.estimate().rtt, None);
    }

    #[test]
    fn lost_ack_keeps_previous_estimate() {
        let mut sync = ClockSync::new(Duration::from_secs(10));
        sync.begin_probe(0).unwrap();
        sync.complete_probe(40);

        // Second probe's ack never arrives; guard releases on tick, the
        // 40ms sample stays.
        sync.begin_probe(1_000).unwrap();
        sync.tick(12_000);

        assert!(!sync.probe_in_flight());
        assert_eq!(sync.estimate().rtt, Some(Duration::from_millis(40)));
        assert!(sync.begin_probe(12_500).is_ok());
    }

    #[test]
    fn tick_before_timeout_keeps_guard() {
        let mut sync = ClockSync::new(Duration::from_secs(10));
        sync.begin_probe(0).unwrap();
        sync.tick(5_000);
        assert!(sync.probe_in_flight());
    }
}
