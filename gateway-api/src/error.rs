//! Tool-surface error shape: maps `GatewayErrorKind` (spec §7) onto the
//! response conventions of the call-tool contract. Errors never become bare
//! HTTP error codes for a tool call; they become a structured payload with
//! `is_error: true` so a caller can render them without inspecting status.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use gateway_core::{GatewayError, GatewayErrorKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Upstream,
    AuthExpired,
    AuthUnavailable,
    AuthConfig,
    RateLimited,
    NotFound,
    CircuitOpen,
    Validation,
    PrivacyDenied,
    Unauthorized,
    BadRequest,
    Internal,
}

impl From<GatewayErrorKind> for ErrorCode {
    fn from(kind: GatewayErrorKind) -> Self {
        match kind {
            GatewayErrorKind::Upstream => ErrorCode::Upstream,
            GatewayErrorKind::AuthExpired => ErrorCode::AuthExpired,
            GatewayErrorKind::AuthUnavailable => ErrorCode::AuthUnavailable,
            GatewayErrorKind::AuthConfig => ErrorCode::AuthConfig,
            GatewayErrorKind::RateLimited => ErrorCode::RateLimited,
            GatewayErrorKind::NotFound => ErrorCode::NotFound,
            GatewayErrorKind::CircuitOpen => ErrorCode::CircuitOpen,
            GatewayErrorKind::Validation => ErrorCode::Validation,
            GatewayErrorKind::PrivacyDenied => ErrorCode::PrivacyDenied,
        }
    }
}

/// A tool-call-level error. Distinct from a transport-level `ApiError`
/// (missing/malformed request envelope, auth to the gateway itself): this
/// is what a dispatched tool's own failure looks like.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ToolError {
    pub fn missing_field(field: &str) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message: format!("required field '{field}' is missing or the wrong type"),
            retry_after_secs: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message: format!("no such tool: {name}"),
            retry_after_secs: None,
        }
    }
}

impl From<GatewayError> for ToolError {
    fn from(err: GatewayError) -> Self {
        let retry_after_secs = match &err {
            GatewayError::HttpCaller(gateway_core::HttpCallerError::RateLimited {
                retry_after_secs,
                ..
            }) => Some(*retry_after_secs),
            GatewayError::RateLimit(gateway_core::RateLimitError::Denied {
                retry_after_secs,
                ..
            }) => Some(*retry_after_secs),
            _ => None,
        };
        Self {
            code: err.kind().into(),
            message: err.to_string(),
            retry_after_secs,
        }
    }
}

/// Transport-level error: the request envelope itself (auth to the
/// gateway, malformed JSON-RPC-ish body) is rejected before a tool ever
/// runs. These DO carry a real HTTP status, unlike `ToolError`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Unauthorized,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message: message.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.code {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}
