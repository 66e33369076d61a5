//! Wall-clock abstraction for deterministic testing.
//!
//! Offset estimation is arithmetic over UTC epoch milliseconds, so the
//! abstraction deals in wall-clock time rather than monotonic instants.
//! Production code uses [`SystemClock`]; tests use
//! [`test_utils::MockClock`] and drive time by hand.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the local UTC wall clock.
///
/// # Invariants
///
/// - `now_utc_ms` must not go backwards within a single execution context
///   (NTP step adjustments excepted; the estimator tolerates them by
///   overwriting rather than accumulating).
pub trait Clock: Clone + Send + Sync + 'static {
    /// Current UTC time in milliseconds since the Unix epoch.
    fn now_utc_ms(&self) -> i64;
}

/// Production clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc_ms(&self) -> i64 {
        // A clock before the epoch is a misconfigured host; saturate to zero
        // rather than propagate an error nothing upstream can act on.
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as i64)
    }
}

/// Deterministic clocks for tests.
pub mod test_utils {
    use std::sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    };

    use super::Clock;

    /// Manually driven clock. Clones share the same underlying time.
    #[derive(Debug, Clone, Default)]
    pub struct MockClock {
        now_ms: Arc<AtomicI64>,
    }

    impl MockClock {
        /// Create a clock reading `now_ms`.
        pub fn at(now_ms: i64) -> Self {
            Self { now_ms: Arc::new(AtomicI64::new(now_ms)) }
        }

        /// Advance the clock by `delta_ms`.
        pub fn advance(&self, delta_ms: i64) {
            self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
        }

        /// Jump the clock to an absolute reading.
        pub fn set(&self, now_ms: i64) {
            self.now_ms.store(now_ms, Ordering::SeqCst);
        }
    }

    impl Clock for MockClock {
        fn now_utc_ms(&self) -> i64 {
            self.now_ms.load(Ordering::SeqCst)
        }
    }
}
