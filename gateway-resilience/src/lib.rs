//! Per-provider resilience: rate limiting, circuit breaking, retry.

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::CircuitBreaker;
pub use rate_limiter::{Admission, RateLimiter};
pub use retry::{retry_or_exhausted, retry_with_backoff};
