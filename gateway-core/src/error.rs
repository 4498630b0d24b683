//! Error taxonomy for the registry gateway.

use thiserror::Error;

/// Credential lifecycle errors (C2).
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("no credential configured for service {service}")]
    NotConfigured { service: String },

    #[error("token endpoint for {service} unreachable: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("token endpoint for {service} rejected credentials: {reason}")]
    Config { service: String, reason: String },

    #[error("malformed token response from {service}: {reason}")]
    MalformedResponse { service: String, reason: String },
}

/// Rate limiter errors (C3).
#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    #[error("rate limit denied for {provider}:{key}, retry after {retry_after_secs}s")]
    Denied {
        provider: String,
        key: String,
        retry_after_secs: u64,
    },
}

/// Circuit breaker errors (C4).
#[derive(Debug, Clone, Error)]
pub enum CircuitError {
    #[error("circuit open for {provider}")]
    Open { provider: String },
}

/// Retry executor errors (C5).
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// HTTP caller errors (C6).
#[derive(Debug, Clone, Error)]
pub enum HttpCallerError {
    #[error("transport error calling {provider}: {reason}")]
    Transport { provider: String, reason: String },

    #[error("{provider} returned 401, token invalidated")]
    AuthExpired { provider: String },

    #[error("{provider} authentication unavailable: {reason}")]
    AuthUnavailable { provider: String, reason: String },

    #[error("{provider} rejected credentials: {reason}")]
    AuthConfig { provider: String, reason: String },

    #[error("{provider} rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },

    #[error("{provider} responded 5xx: {status}")]
    UpstreamServerError { provider: String, status: u16 },

    #[error("{provider} returned an unparseable body: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// KV cache errors (C7).
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend error: {reason}")]
    Backend { reason: String },

    #[error("failed to serialize cache value: {reason}")]
    Serialize { reason: String },
}

/// Analytic store adapter errors (C8).
#[derive(Debug, Clone, Error)]
pub enum AnalyticsError {
    #[error("load of table {table} failed: {reason}")]
    LoadFailed { table: String, reason: String },

    #[error("query execution failed: {reason}")]
    QueryFailed { reason: String },

    #[error("checksum mismatch for {table}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        table: String,
        expected: String,
        actual: String,
    },
}

/// Provider adapter errors (C9).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("upstream error from {provider}: {reason}")]
    Upstream { provider: String, reason: String },

    #[error("{provider}: not found")]
    NotFound { provider: String },

    #[error("{provider}: circuit open")]
    CircuitOpen { provider: String },
}

/// Fan-out and fusion errors (C10).
#[derive(Debug, Clone, Error)]
pub enum FanoutError {
    #[error("all {attempted} sources failed for request {fingerprint}")]
    AllSourcesFailed { fingerprint: String, attempted: usize },

    #[error("validation failed: {reason}")]
    Validation { reason: String },
}

/// Privacy redaction errors (C11).
#[derive(Debug, Clone, Error)]
pub enum PrivacyError {
    #[error("operation denied by privacy policy: {reason}")]
    Denied { reason: String },
}

/// Ingestion scheduler errors (C12).
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("download of {source_url} failed: {reason}")]
    DownloadFailed { source_url: String, reason: String },

    #[error("checksum verification failed for {source_url}")]
    ChecksumFailed { source_url: String },

    #[error("job {name} is already running")]
    AlreadyRunning { name: String },

    #[error("no ingestion job named {name}")]
    NotFound { name: String },
}

/// Audit ledger errors (C13).
#[derive(Debug, Clone, Error)]
pub enum AuditError {
    #[error("failed to flush audit buffer: {reason}")]
    FlushFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration option: {key}")]
    UnknownOption { key: String },
}

/// Master error type for all gateway operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("circuit breaker error: {0}")]
    Circuit(#[from] CircuitError),

    #[error("retry error: {0}")]
    Retry(#[from] RetryError),

    #[error("http caller error: {0}")]
    HttpCaller(#[from] HttpCallerError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("fan-out error: {0}")]
    Fanout(#[from] FanoutError),

    #[error("privacy error: {0}")]
    Privacy(#[from] PrivacyError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// The error-kind taxonomy from the error handling design: every terminal
/// operation's error maps to exactly one of these, independent of which
/// concrete enum variant produced it. Retry/breaker/tool-surface layers
/// dispatch on this instead of matching concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Upstream,
    AuthExpired,
    AuthUnavailable,
    AuthConfig,
    RateLimited,
    NotFound,
    CircuitOpen,
    Validation,
    PrivacyDenied,
}

impl GatewayError {
    /// Classify this error into the taxonomy from the error handling design.
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::HttpCaller(HttpCallerError::AuthExpired { .. }) => {
                GatewayErrorKind::AuthExpired
            }
            GatewayError::HttpCaller(HttpCallerError::AuthUnavailable { .. })
            | GatewayError::Credential(CredentialError::Unavailable { .. }) => {
                GatewayErrorKind::AuthUnavailable
            }
            GatewayError::HttpCaller(HttpCallerError::AuthConfig { .. })
            | GatewayError::Credential(CredentialError::Config { .. }) => {
                GatewayErrorKind::AuthConfig
            }
            GatewayError::HttpCaller(HttpCallerError::RateLimited { .. })
            | GatewayError::RateLimit(_) => GatewayErrorKind::RateLimited,
            GatewayError::Provider(ProviderError::NotFound { .. })
            | GatewayError::Ingest(IngestError::NotFound { .. }) => GatewayErrorKind::NotFound,
            GatewayError::Circuit(_) | GatewayError::Provider(ProviderError::CircuitOpen { .. }) => {
                GatewayErrorKind::CircuitOpen
            }
            GatewayError::Fanout(FanoutError::Validation { .. }) => GatewayErrorKind::Validation,
            GatewayError::Privacy(_) => GatewayErrorKind::PrivacyDenied,
            _ => GatewayErrorKind::Upstream,
        }
    }

    /// Whether the retry executor's retryable-error predicate admits this
    /// error (spec §4.4): connection/timeout errors, or an HTTP error in
    /// {500,502,503,504,429}.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::HttpCaller(HttpCallerError::Transport { .. })
                | GatewayError::HttpCaller(HttpCallerError::UpstreamServerError { .. })
                | GatewayError::HttpCaller(HttpCallerError::RateLimited { .. })
        )
    }
}
