//! Circuit breaker (C4): per-provider three-state machine.

use gateway_core::{BreakerConfig, CircuitState, GatewayClock, SharedClock};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::RwLock;
use std::time::Instant;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

fn state_from_u8(v: u8) -> CircuitState {
    match v {
        STATE_OPEN => CircuitState::Open,
        STATE_HALF_OPEN => CircuitState::HalfOpen,
        _ => CircuitState::Closed,
    }
}

/// Lock-free reads for `is_allowed`/`state`; transitions are serialized by
/// a short critical section under `last_failure`.
pub struct CircuitBreaker {
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    half_open_calls: AtomicU32,
    last_failure: RwLock<Option<Instant>>,
    config: BreakerConfig,
    clock: SharedClock,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &state_from_u8(self.state.load(Ordering::SeqCst)))
            .field("failure_count", &self.failure_count.load(Ordering::SeqCst))
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, clock: SharedClock) -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            half_open_calls: AtomicU32::new(0),
            last_failure: RwLock::new(None),
            config,
            clock,
        }
    }

    pub fn state(&self) -> CircuitState {
        state_from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether a call should be allowed through right now. Transitions
    /// `open -> half_open` when the recovery timeout has elapsed.
    pub fn is_allowed(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                self.half_open_calls.load(Ordering::SeqCst) < self.config.half_open_max_calls
            }
            CircuitState::Open => {
                let elapsed_ok = {
                    let guard = self.last_failure.read().unwrap();
                    guard
                        .map(|t| self.clock.now_monotonic().duration_since(t) >= self.config.recovery_timeout)
                        .unwrap_or(false)
                };
                if elapsed_ok {
                    self.state.store(STATE_HALF_OPEN, Ordering::SeqCst);
                    self.half_open_calls.store(0, Ordering::SeqCst);
                    self.success_count.store(0, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Only "expected" failures (network/timeout/5xx/429) should be passed
    /// here; the caller filters using `GatewayError::is_retryable`/`kind()`.
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.state.store(STATE_OPEN, Ordering::SeqCst);
                *self.last_failure.write().unwrap() = Some(self.clock.now_monotonic());
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.state.store(STATE_OPEN, Ordering::SeqCst);
                    *self.last_failure.write().unwrap() = Some(self.clock.now_monotonic());
                }
            }
            CircuitState::Open => {
                *self.last_failure.write().unwrap() = Some(self.clock.now_monotonic());
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.half_open_calls.fetch_add(1, Ordering::SeqCst);
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.reset();
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        self.half_open_calls.store(0, Ordering::SeqCst);
        *self.last_failure.write().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::system_clock;
    use std::time::Duration;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            BreakerConfig {
                failure_threshold: threshold,
                success_threshold: 2,
                recovery_timeout: recovery,
                half_open_max_calls: 2,
            },
            system_clock(),
        )
    }

    #[test]
    fn closed_admits_calls() {
        let b = breaker(5, Duration::from_secs(30));
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.is_allowed());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let b = breaker(3, Duration::from_secs(30));
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.is_allowed());
    }

    #[test]
    fn half_open_recovers_to_closed_on_successes() {
        let b = breaker(1, Duration::from_millis(1));
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        assert!(b.is_allowed());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_success();
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let b = breaker(1, Duration::from_millis(1));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(b.is_allowed());
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }
}
