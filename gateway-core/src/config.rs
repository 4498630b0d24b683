//! Environment-driven configuration (spec §6 "Environment", SPEC_FULL §10.3).

use crate::error::{ConfigError, GatewayResult};
use secrecy::SecretString;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secret(key: &str) -> Option<SecretString> {
    std::env::var(key).ok().map(SecretString::from)
}

/// Per-provider rate limit and cache TTL defaults (spec §4.2, §4.6).
#[derive(Debug, Clone)]
pub struct ProviderLimits {
    pub window_secs: u64,
    pub ceiling: u32,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            window_secs: 60,
            ceiling: 120,
        }
    }
}

/// Circuit breaker tuning (spec §4.3).
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }
}

/// Retry executor tuning (spec §4.4).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Cache TTL policy (spec §4.6 "TTL policy").
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub search_results: Duration,
    pub entity_profile: Duration,
    pub documents: Duration,
    pub announcement_searches: Duration,
    pub certifications: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            search_results: Duration::from_secs(300),
            entity_profile: Duration::from_secs(3600),
            documents: Duration::from_secs(86_400),
            announcement_searches: Duration::from_secs(300),
            certifications: Duration::from_secs(3600),
        }
    }
}

/// The full gateway configuration, loaded once at boot and threaded
/// explicitly to every component (SPEC_FULL §9 "Singletons": no module-level
/// statics).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub secret_prefix: String,
    pub kv_url: String,
    pub analytic_store_path: String,
    pub log_level: String,
    pub provider_limits: ProviderLimits,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub cache_ttls: CacheTtls,
    pub fanout_semaphore: usize,
    pub http_timeout: Duration,
    pub document_timeout: Duration,
    pub credential_skew: Duration,
    pub audit_flush_size: usize,
    pub audit_flush_interval: Duration,
    pub api_bind: String,
    pub api_port: u16,
    /// Caller API keys accepted by the tool-surface binary; empty means the
    /// binary runs unauthenticated (development only).
    pub api_keys: Vec<SecretString>,
    pub jwt_secret: Option<SecretString>,
}

const KNOWN_ENV_KEYS: &[&str] = &[
    "GATEWAY_SECRET_PREFIX",
    "GATEWAY_KV_URL",
    "GATEWAY_ANALYTIC_STORE_PATH",
    "GATEWAY_LOG_LEVEL",
    "GATEWAY_RATE_LIMIT_WINDOW_SECS",
    "GATEWAY_RATE_LIMIT_CEILING",
    "GATEWAY_BREAKER_FAILURE_THRESHOLD",
    "GATEWAY_BREAKER_SUCCESS_THRESHOLD",
    "GATEWAY_BREAKER_RECOVERY_SECS",
    "GATEWAY_BREAKER_HALF_OPEN_MAX_CALLS",
    "GATEWAY_RETRY_MAX_ATTEMPTS",
    "GATEWAY_RETRY_MIN_WAIT_SECS",
    "GATEWAY_RETRY_MAX_WAIT_SECS",
    "GATEWAY_RETRY_MULTIPLIER",
    "GATEWAY_FANOUT_SEMAPHORE",
    "GATEWAY_HTTP_TIMEOUT_SECS",
    "GATEWAY_DOCUMENT_TIMEOUT_SECS",
    "GATEWAY_CREDENTIAL_SKEW_SECS",
    "GATEWAY_AUDIT_FLUSH_SIZE",
    "GATEWAY_AUDIT_FLUSH_INTERVAL_SECS",
    "GATEWAY_API_BIND",
    "GATEWAY_API_PORT",
    "GATEWAY_API_KEYS",
    "GATEWAY_JWT_SECRET",
];

impl GatewayConfig {
    /// Load configuration from `GATEWAY_*` environment variables, falling
    /// back to the defaults documented per field above.
    pub fn from_env() -> GatewayResult<Self> {
        Self::reject_unknown_options()?;
        Ok(Self {
            secret_prefix: std::env::var("GATEWAY_SECRET_PREFIX").unwrap_or_default(),
            kv_url: std::env::var("GATEWAY_KV_URL").unwrap_or_else(|_| "memory://".to_string()),
            analytic_store_path: std::env::var("GATEWAY_ANALYTIC_STORE_PATH")
                .unwrap_or_else(|_| "./analytics".to_string()),
            log_level: std::env::var("GATEWAY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            provider_limits: ProviderLimits {
                window_secs: env_parse("GATEWAY_RATE_LIMIT_WINDOW_SECS", 60),
                ceiling: env_parse("GATEWAY_RATE_LIMIT_CEILING", 120),
            },
            breaker: BreakerConfig {
                failure_threshold: env_parse("GATEWAY_BREAKER_FAILURE_THRESHOLD", 5),
                success_threshold: env_parse("GATEWAY_BREAKER_SUCCESS_THRESHOLD", 3),
                recovery_timeout: Duration::from_secs(env_parse(
                    "GATEWAY_BREAKER_RECOVERY_SECS",
                    30,
                )),
                half_open_max_calls: env_parse("GATEWAY_BREAKER_HALF_OPEN_MAX_CALLS", 3),
            },
            retry: RetryConfig {
                max_attempts: env_parse("GATEWAY_RETRY_MAX_ATTEMPTS", 3),
                min_wait: Duration::from_secs(env_parse("GATEWAY_RETRY_MIN_WAIT_SECS", 1)),
                max_wait: Duration::from_secs(env_parse("GATEWAY_RETRY_MAX_WAIT_SECS", 30)),
                multiplier: env_parse("GATEWAY_RETRY_MULTIPLIER", 2.0),
                jitter: 0.2,
            },
            cache_ttls: CacheTtls::default(),
            fanout_semaphore: env_parse("GATEWAY_FANOUT_SEMAPHORE", 5),
            http_timeout: Duration::from_secs(env_parse("GATEWAY_HTTP_TIMEOUT_SECS", 30)),
            document_timeout: Duration::from_secs(env_parse("GATEWAY_DOCUMENT_TIMEOUT_SECS", 300)),
            credential_skew: Duration::from_secs(env_parse("GATEWAY_CREDENTIAL_SKEW_SECS", 300)),
            audit_flush_size: env_parse("GATEWAY_AUDIT_FLUSH_SIZE", 100),
            audit_flush_interval: Duration::from_secs(env_parse(
                "GATEWAY_AUDIT_FLUSH_INTERVAL_SECS",
                60,
            )),
            api_bind: std::env::var("GATEWAY_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env_parse("GATEWAY_API_PORT", 8080),
            api_keys: std::env::var("GATEWAY_API_KEYS")
                .ok()
                .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(SecretString::from).collect())
                .unwrap_or_default(),
            jwt_secret: env_secret("GATEWAY_JWT_SECRET"),
        })
    }

    fn reject_unknown_options() -> GatewayResult<()> {
        for (key, _) in std::env::vars() {
            if key.starts_with("GATEWAY_") && !KNOWN_ENV_KEYS.contains(&key.as_str()) {
                return Err(ConfigError::UnknownOption { key }.into());
            }
        }
        Ok(())
    }

    /// Reject nonsensical values (spec §6 "Unknown options rejected" sibling
    /// rule: known options must still be sane).
    pub fn validate(&self) -> GatewayResult<()> {
        if self.provider_limits.ceiling == 0 {
            return Err(ConfigError::InvalidValue {
                field: "provider_limits.ceiling".into(),
                value: "0".into(),
                reason: "rate limit ceiling must be positive".into(),
            }
            .into());
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "breaker.failure_threshold".into(),
                value: "0".into(),
                reason: "circuit breaker threshold must be positive".into(),
            }
            .into());
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".into(),
                value: "0".into(),
                reason: "at least one attempt is required".into(),
            }
            .into());
        }
        if self.fanout_semaphore == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fanout_semaphore".into(),
                value: "0".into(),
                reason: "fan-out concurrency must be positive".into(),
            }
            .into());
        }
        if self.audit_flush_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audit_flush_size".into(),
                value: "0".into(),
                reason: "audit buffer must flush eventually".into(),
            }
            .into());
        }
        Ok(())
    }
}

/// A named credential secret read from `<prefix>_<SERVICE>_<FIELD>`.
pub fn secret_env(prefix: &str, service: &str, field: &str) -> Option<SecretString> {
    let key = if prefix.is_empty() {
        format!("GATEWAY_{}_{}", service.to_uppercase(), field.to_uppercase())
    } else {
        format!(
            "{}_{}_{}",
            prefix.to_uppercase(),
            service.to_uppercase(),
            field.to_uppercase()
        )
    };
    env_secret(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean() {
        let cfg = GatewayConfig {
            secret_prefix: String::new(),
            kv_url: "memory://".into(),
            analytic_store_path: "./analytics".into(),
            log_level: "info".into(),
            provider_limits: ProviderLimits::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            cache_ttls: CacheTtls::default(),
            fanout_semaphore: 5,
            http_timeout: Duration::from_secs(30),
            document_timeout: Duration::from_secs(300),
            credential_skew: Duration::from_secs(300),
            audit_flush_size: 100,
            audit_flush_interval: Duration::from_secs(60),
            api_bind: "0.0.0.0".into(),
            api_port: 8080,
            api_keys: Vec::new(),
            jwt_secret: None,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let mut cfg_limits = ProviderLimits::default();
        cfg_limits.ceiling = 0;
        let cfg = GatewayConfig {
            secret_prefix: String::new(),
            kv_url: "memory://".into(),
            analytic_store_path: "./analytics".into(),
            log_level: "info".into(),
            provider_limits: cfg_limits,
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            cache_ttls: CacheTtls::default(),
            fanout_semaphore: 5,
            http_timeout: Duration::from_secs(30),
            document_timeout: Duration::from_secs(300),
            credential_skew: Duration::from_secs(300),
            audit_flush_size: 100,
            audit_flush_interval: Duration::from_secs(60),
            api_bind: "0.0.0.0".into(),
            api_port: 8080,
            api_keys: Vec::new(),
            jwt_secret: None,
        };
        assert!(cfg.validate().is_err());
    }
}
