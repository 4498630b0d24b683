//! HTTP Caller (C6): single entry point for any provider request.
//!
//! Composition order (outermost first): rate limit -> circuit breaker ->
//! retry -> transport.

use dashmap::DashMap;
use gateway_core::{
    BreakerConfig, GatewayClock, GatewayResult, HttpCallerError, ProviderLimits, RetryConfig,
    SharedClock,
};
use gateway_credentials::CredentialStore;
use gateway_resilience::{retry_with_backoff, CircuitBreaker, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Static per-provider declaration (spec §4.8): everything an adapter needs
/// to speak to its upstream through the caller.
#[derive(Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub base_url: String,
    pub auth_service: Option<String>,
    pub rate_limit: ProviderLimits,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub timeout: Duration,
    pub document_timeout: Duration,
}

#[derive(Clone, Copy, Debug)]
pub enum Method {
    Get,
    Post,
}

/// One upstream request. `document` selects the longer document timeout
/// profile (spec §4.5).
pub struct HttpRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    pub json_body: Option<serde_json::Value>,
    pub document: bool,
}

impl<'a> HttpRequest<'a> {
    pub fn get(path: &'a str) -> Self {
        Self {
            method: Method::Get,
            path,
            query: &[],
            json_body: None,
            document: false,
        }
    }
}

pub struct RawResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

/// Shared per-provider HTTP transport, rate limiter, breaker and credential
/// store (spec §5 "Resource sharing": one HTTP client per adapter, shared
/// across tasks).
pub struct HttpCaller {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
    limiter: Arc<RateLimiter>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    clock: SharedClock,
}

impl HttpCaller {
    pub fn new(credentials: Arc<CredentialStore>, limiter: Arc<RateLimiter>, clock: SharedClock) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            limiter,
            breakers: DashMap::new(),
            clock,
        }
    }

    fn breaker_for(&self, spec: &ProviderSpec) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(spec.name.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(spec.breaker.clone(), self.clock.clone())))
            .clone()
    }

    /// Issue one request and deserialize a JSON response.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        spec: &ProviderSpec,
        request: HttpRequest<'_>,
    ) -> GatewayResult<T> {
        let raw = self.call(spec, request).await?;
        serde_json::from_slice(&raw.bytes).map_err(|e| {
            HttpCallerError::InvalidResponse {
                provider: spec.name.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Issue one request, returning the raw bytes (used for document downloads).
    pub async fn call(&self, spec: &ProviderSpec, request: HttpRequest<'_>) -> GatewayResult<RawResponse> {
        let admission = self.limiter.admit(&spec.name, "default", &spec.rate_limit);
        if !admission.ok {
            return Err(HttpCallerError::RateLimited {
                provider: spec.name.clone(),
                retry_after_secs: admission.retry_after_secs,
            }
            .into());
        }

        let breaker = self.breaker_for(spec);
        if !breaker.is_allowed() {
            return Err(gateway_core::CircuitError::Open {
                provider: spec.name.clone(),
            }
            .into());
        }

        let result = retry_with_backoff(&spec.retry, || self.transport_call(spec, &request)).await;

        match &result {
            Ok(_) => breaker.record_success(),
            Err(e) if e.is_retryable() => breaker.record_failure(),
            Err(_) => {}
        }

        result
    }

    async fn transport_call(
        &self,
        spec: &ProviderSpec,
        request: &HttpRequest<'_>,
    ) -> GatewayResult<RawResponse> {
        let url = format!("{}{}", spec.base_url, request.path);
        let timeout = if request.document {
            spec.document_timeout
        } else {
            spec.timeout
        };

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        builder = builder.timeout(timeout).query(request.query);
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        if let Some(service) = &spec.auth_service {
            let headers = self.credentials.headers_for(service).await?;
            for (k, v) in headers {
                builder = builder.header(k, v);
            }
        }

        let response = builder.send().await.map_err(|e| HttpCallerError::Transport {
            provider: spec.name.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();

        if status.as_u16() == 401 {
            if let Some(service) = &spec.auth_service {
                let _ = self.credentials.invalidate(service).await;
            }
            return Err(HttpCallerError::AuthExpired {
                provider: spec.name.clone(),
            }
            .into());
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(spec.rate_limit.window_secs);
            return Err(HttpCallerError::RateLimited {
                provider: spec.name.clone(),
                retry_after_secs: retry_after,
            }
            .into());
        }

        if status.is_server_error() {
            return Err(HttpCallerError::UpstreamServerError {
                provider: spec.name.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HttpCallerError::Transport {
                provider: spec.name.clone(),
                reason: e.to_string(),
            })?
            .to_vec();

        Ok(RawResponse {
            status: status.as_u16(),
            bytes,
        })
    }
}

/// Helper for adapters building query parameter slices from typed filters.
pub fn to_query_pairs<T: Serialize>(value: &T) -> GatewayResult<Vec<(String, String)>> {
    let json = serde_json::to_value(value).map_err(|e| HttpCallerError::InvalidResponse {
        provider: "query-builder".into(),
        reason: e.to_string(),
    })?;
    let mut pairs = Vec::new();
    if let serde_json::Value::Object(map) = json {
        for (k, v) in map {
            if v.is_null() {
                continue;
            }
            let s = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            pairs.push((k, s));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::system_clock;

    fn caller() -> HttpCaller {
        let clock = system_clock();
        let credentials = Arc::new(CredentialStore::new(clock.clone(), Duration::from_secs(300)));
        let limiter = Arc::new(RateLimiter::new(clock.clone()));
        HttpCaller::new(credentials, limiter, clock)
    }

    fn spec(name: &str) -> ProviderSpec {
        ProviderSpec {
            name: name.to_string(),
            base_url: "http://127.0.0.1:0".to_string(),
            auth_service: None,
            rate_limit: ProviderLimits {
                window_secs: 60,
                ceiling: 1,
            },
            breaker: BreakerConfig::default(),
            retry: RetryConfig {
                max_attempts: 1,
                min_wait: Duration::from_millis(1),
                max_wait: Duration::from_millis(1),
                multiplier: 2.0,
                jitter: 0.0,
            },
            timeout: Duration::from_millis(50),
            document_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn rate_limiter_denies_second_call_in_window() {
        let caller = caller();
        let spec = spec("insee");
        let _ = caller.call(&spec, HttpRequest::get("/ping")).await;
        let second = caller.call(&spec, HttpRequest::get("/ping")).await;
        assert!(matches!(
            second,
            Err(gateway_core::GatewayError::HttpCaller(
                HttpCallerError::RateLimited { .. }
            ))
        ));
    }
}
