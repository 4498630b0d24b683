//! Monotonic-safe clock abstraction.
//!
//! Every component that reasons about expiry (credential tokens, circuit
//! breaker timers, rate limiter windows, cache TTLs) takes a `Arc<dyn
//! GatewayClock>` rather than calling `Utc::now()`/`Instant::now()`
//! directly, so tests can advance time deterministically instead of
//! sleeping on a wall clock.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// Abstracts over wall-clock and monotonic time.
pub trait GatewayClock: Send + Sync {
    /// Current UTC time, used for expiry comparisons against stored timestamps.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current monotonic instant, used for interval timers (circuit breaker
    /// recovery, rate limiter windows) that must never jump backward.
    fn now_monotonic(&self) -> Instant;
}

/// Production clock backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl GatewayClock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock for tests: advances only when told to.
pub struct FixedClock {
    utc: std::sync::Mutex<DateTime<Utc>>,
    monotonic_offset_ms: std::sync::atomic::AtomicI64,
    monotonic_base: Instant,
}

impl FixedClock {
    pub fn new(utc: DateTime<Utc>) -> Self {
        Self {
            utc: std::sync::Mutex::new(utc),
            monotonic_offset_ms: std::sync::atomic::AtomicI64::new(0),
            monotonic_base: Instant::now(),
        }
    }

    /// Advance both the wall clock and the monotonic clock by `duration`.
    pub fn advance(&self, duration: std::time::Duration) {
        let mut utc = self.utc.lock().unwrap();
        *utc += chrono::Duration::from_std(duration).unwrap();
        self.monotonic_offset_ms.fetch_add(
            duration.as_millis() as i64,
            std::sync::atomic::Ordering::SeqCst,
        );
    }
}

impl GatewayClock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc.lock().unwrap()
    }

    fn now_monotonic(&self) -> Instant {
        let offset_ms = self.monotonic_offset_ms.load(std::sync::atomic::Ordering::SeqCst);
        self.monotonic_base + std::time::Duration::from_millis(offset_ms.max(0) as u64)
    }
}

/// Shared handle to a clock, the shape every component stores.
pub type SharedClock = Arc<dyn GatewayClock>;

/// Construct the production clock handle.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_both_scales() {
        let clock = FixedClock::new(Utc::now());
        let utc0 = clock.now_utc();
        let mono0 = clock.now_monotonic();
        clock.advance(std::time::Duration::from_secs(30));
        assert!(clock.now_utc() > utc0);
        assert!(clock.now_monotonic() > mono0);
    }
}
