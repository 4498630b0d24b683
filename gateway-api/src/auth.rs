//! Caller authentication middleware (grounded on the API-key/bearer header
//! extraction idiom): checks `X-API-Key` or `Authorization: Bearer` against
//! the configured caller keys and injects a `CallerContext` carrying the
//! identity recorded on every audit entry. Empty `api_keys` disables
//! authentication for local development.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct CallerContext {
    pub caller_id: String,
    pub ip: Option<String>,
}

pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut request: Request, next: Next) -> Response {
    if state.config.api_keys.is_empty() {
        request.extensions_mut().insert(CallerContext {
            caller_id: "anonymous".to_string(),
            ip: client_ip(&request),
        });
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            request
                .headers()
                .get("authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::to_string)
        });

    let Some(presented) = presented else {
        return ApiError::unauthorized("provide X-API-Key or an Authorization: Bearer header").into_response();
    };

    let matched = state
        .config
        .api_keys
        .iter()
        .any(|key| key.expose_secret() == presented);
    if !matched {
        return ApiError::unauthorized("caller key not recognized").into_response();
    }

    request.extensions_mut().insert(CallerContext {
        caller_id: hashed_caller_id(&presented),
        ip: client_ip(&request),
    });
    next.run(request).await
}

fn client_ip(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

/// Callers are identified in audit entries by a short prefix of their key,
/// never the key itself.
fn hashed_caller_id(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("key:{prefix}")
}
