//! Rate limiter (C3): per-provider, per-key fixed-window budgets.
//!
//! `admit` sets the counter and its window atomically on the first request
//! of a window; subsequent requests within the window only increment.

use dashmap::DashMap;
use gateway_core::{GatewayClock, ProviderLimits, SharedClock};
use std::sync::Mutex;
use std::time::Duration;

struct Window {
    count: u32,
    window_end: chrono::DateTime<chrono::Utc>,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub ok: bool,
    pub retry_after_secs: u64,
}

/// One fixed-window limiter per `(provider, key)` pair. A distinct
/// `RateLimiter` instance can be used for a provider's document endpoints
/// when they carry a separate budget from its JSON endpoints (spec §4.2).
pub struct RateLimiter {
    windows: DashMap<String, Mutex<Window>>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// `admit(provider, key) -> (ok, retry_after_seconds)`.
    pub fn admit(&self, provider: &str, key: &str, limits: &ProviderLimits) -> Admission {
        let bucket_key = format!("{provider}:{key}");
        let now = self.clock.now_utc();
        let window = Duration::from_secs(limits.window_secs);

        let entry = self
            .windows
            .entry(bucket_key)
            .or_insert_with(|| {
                Mutex::new(Window {
                    count: 0,
                    window_end: now + chrono::Duration::from_std(window).unwrap(),
                })
            });
        let mut guard = entry.lock().unwrap();

        if now >= guard.window_end {
            guard.count = 0;
            guard.window_end = now + chrono::Duration::from_std(window).unwrap();
        }

        if guard.count >= limits.ceiling {
            let retry_after = (guard.window_end - now).num_seconds().max(0) as u64;
            return Admission {
                ok: false,
                retry_after_secs: retry_after,
            };
        }

        guard.count += 1;
        Admission {
            ok: true,
            retry_after_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::FixedClock;
    use std::sync::Arc;

    fn limiter_with_clock() -> (RateLimiter, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        (RateLimiter::new(clock.clone()), clock)
    }

    #[test]
    fn admits_up_to_ceiling_then_denies() {
        let (limiter, _clock) = limiter_with_clock();
        let limits = ProviderLimits {
            window_secs: 60,
            ceiling: 3,
        };
        for _ in 0..3 {
            assert!(limiter.admit("insee", "tenant-1", &limits).ok);
        }
        let denied = limiter.admit("insee", "tenant-1", &limits);
        assert!(!denied.ok);
        assert!(denied.retry_after_secs > 0);
    }

    #[test]
    fn window_reset_admits_again() {
        let (limiter, clock) = limiter_with_clock();
        let limits = ProviderLimits {
            window_secs: 60,
            ceiling: 1,
        };
        assert!(limiter.admit("insee", "tenant-1", &limits).ok);
        assert!(!limiter.admit("insee", "tenant-1", &limits).ok);
        clock.advance(Duration::from_secs(61));
        assert!(limiter.admit("insee", "tenant-1", &limits).ok);
    }

    #[test]
    fn keys_are_isolated_per_provider() {
        let (limiter, _clock) = limiter_with_clock();
        let limits = ProviderLimits {
            window_secs: 60,
            ceiling: 1,
        };
        assert!(limiter.admit("insee", "tenant-1", &limits).ok);
        assert!(limiter.admit("bodacc", "tenant-1", &limits).ok);
    }
}
