//! Retry executor (C5): bounded retries with jittered exponential backoff.

use gateway_core::{GatewayError, GatewayResult, RetryConfig};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

fn backoff_for(attempt: u32, config: &RetryConfig) -> Duration {
    let exp = config.multiplier.powi(attempt as i32 - 1);
    let base = (config.min_wait.as_secs_f64() * exp).min(config.max_wait.as_secs_f64());
    let jitter_span = base * config.jitter;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    Duration::from_secs_f64((base + jitter).max(0.0))
}

/// Wrap an async operation with at most `config.max_attempts` attempts.
/// Retries iff the retryable predicate (spec §4.4) held on the last error;
/// non-retryable errors short-circuit immediately.
pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, mut op: F) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !err.is_retryable() {
                    return Err(err);
                }
                let wait = backoff_for(attempt, config);
                tracing::warn!(attempt, ?wait, error = %err, "retrying after backoff");
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Convenience wrapper returning the exhausted-retries error kind instead of
/// the last upstream error, for callers that want a uniform retry-layer error.
pub async fn retry_or_exhausted<F, Fut, T>(config: &RetryConfig, op: F) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    match retry_with_backoff(config, op).await {
        Ok(v) => Ok(v),
        Err(last) if last.is_retryable() => Err(GatewayError::from(
            gateway_core::RetryError::Exhausted {
                attempts: config.max_attempts,
                last_error: last.to_string(),
            },
        )),
        Err(non_retryable) => Err(non_retryable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::HttpCallerError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cfg() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: GatewayResult<u32> = retry_with_backoff(&cfg(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: GatewayResult<u32> = retry_with_backoff(&cfg(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GatewayError::from(HttpCallerError::UpstreamServerError {
                    provider: "insee".into(),
                    status: 503,
                }))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_short_circuit() {
        let calls = AtomicU32::new(0);
        let result: GatewayResult<u32> = retry_with_backoff(&cfg(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GatewayError::from(HttpCallerError::AuthConfig {
                    provider: "inpi".into(),
                    reason: "bad client secret".into(),
                }))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
