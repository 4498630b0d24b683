//! Credential Store (C2): obtain, cache and refresh tokens of several
//! kinds; serialize refresh per service.
//!
//! The refresh path uses a dedicated HTTP client, never an adapter's pooled
//! transport, to avoid the dependency cycle noted in the design notes
//! (adapters depend on the credential store; the store's refresh path must
//! not depend back on an adapter's client).

use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use gateway_core::{CredentialError, GatewayClock, GatewayResult, SharedClock, Token, TokenKind};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;

/// One of the three credential shapes a provider may require (spec §4.1).
#[derive(Clone)]
pub enum CredentialSpec {
    ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: SecretString,
        scope: Option<String>,
    },
    PasswordLogin {
        login_url: String,
        username: String,
        password: SecretString,
        default_ttl: Duration,
    },
    StaticBearer {
        token: SecretString,
        default_ttl: Duration,
    },
}

/// A service's credential spec plus any additional headers that must be
/// attached without leaking credentials into logs (spec §4.1 point 6).
#[derive(Clone)]
pub struct ServiceConfig {
    pub service: String,
    pub spec: CredentialSpec,
    pub extra_headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

struct ServiceState {
    config: ServiceConfig,
    token: Option<Token>,
}

/// Per-service mutex guarding the cached token; concurrent `headers_for`
/// calls against an expired token converge on one refresh (spec §8 item 1
/// and scenario D).
pub struct CredentialStore {
    http: reqwest::Client,
    services: DashMap<String, Arc<TokioMutex<ServiceState>>>,
    clock: SharedClock,
    skew: ChronoDuration,
}

impl CredentialStore {
    pub fn new(clock: SharedClock, skew: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("dedicated credential-store http client"),
            services: DashMap::new(),
            clock,
            skew: ChronoDuration::from_std(skew).unwrap_or(ChronoDuration::seconds(300)),
        }
    }

    pub fn register(&self, config: ServiceConfig) {
        self.services.insert(
            config.service.clone(),
            Arc::new(TokioMutex::new(ServiceState {
                config,
                token: None,
            })),
        );
    }

    fn state_lock(&self, service: &str) -> GatewayResult<Arc<TokioMutex<ServiceState>>> {
        self.services
            .get(service)
            .map(|e| e.clone())
            .ok_or_else(|| {
                CredentialError::NotConfigured {
                    service: service.to_string(),
                }
                .into()
            })
    }

    /// `headers_for(service) -> map<string,string>` (spec §4.1).
    pub async fn headers_for(&self, service: &str) -> GatewayResult<HashMap<String, String>> {
        let lock = self.state_lock(service)?;
        let mut state = lock.lock().await;
        let now = self.clock.now_utc();

        let needs_refresh = match &state.token {
            Some(t) => t.expired(now, self.skew),
            None => true,
        };

        if needs_refresh {
            let refreshed = self.materialize(&state.config, state.token.take()).await?;
            state.token = Some(refreshed);
        }

        let token = state.token.as_ref().expect("token materialized above");
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", token.value.expose_secret()),
        );
        for (k, v) in &state.config.extra_headers {
            headers.insert(k.clone(), v.clone());
        }
        Ok(headers)
    }

    /// Call after a 401: drops the cached token so the next `headers_for`
    /// re-authenticates (spec §4.1 point 5).
    pub async fn invalidate(&self, service: &str) -> GatewayResult<()> {
        let lock = self.state_lock(service)?;
        let mut state = lock.lock().await;
        state.token = None;
        Ok(())
    }

    async fn materialize(
        &self,
        config: &ServiceConfig,
        previous: Option<Token>,
    ) -> GatewayResult<Token> {
        match &config.spec {
            CredentialSpec::ClientCredentials {
                token_url,
                client_id,
                client_secret,
                scope,
            } => {
                // Prefer the refresh_token grant when a previous token carried one.
                if let Some(prev) = &previous {
                    if let Some(refresh_token) = &prev.refresh_token {
                        let attempt = self
                            .exchange_client_credentials(
                                token_url,
                                client_id,
                                client_secret,
                                scope.as_deref(),
                                Some(refresh_token.expose_secret()),
                            )
                            .await;
                        if let Ok(token) = attempt {
                            return Ok(token);
                        }
                        tracing::warn!(service = %config.service, "refresh_token grant failed, falling back to full re-authentication");
                    }
                }
                self.exchange_client_credentials(
                    token_url,
                    client_id,
                    client_secret,
                    scope.as_deref(),
                    None,
                )
                .await
            }
            CredentialSpec::PasswordLogin {
                login_url,
                username,
                password,
                default_ttl,
            } => self
                .login_password(login_url, username, password, *default_ttl)
                .await,
            CredentialSpec::StaticBearer { token, default_ttl } => Ok(Token {
                value: token.clone(),
                expiry: Some(self.clock.now_utc() + ChronoDuration::from_std(*default_ttl).unwrap()),
                kind: TokenKind::StaticBearer,
                refresh_token: None,
            }),
        }
    }

    async fn exchange_client_credentials(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &SecretString,
        scope: Option<&str>,
        refresh_token: Option<&str>,
    ) -> GatewayResult<Token> {
        let mut form: Vec<(&str, &str)> = Vec::new();
        if let Some(rt) = refresh_token {
            form.push(("grant_type", "refresh_token"));
            form.push(("refresh_token", rt));
        } else {
            form.push(("grant_type", "client_credentials"));
        }
        form.push(("client_id", client_id));
        form.push(("client_secret", client_secret.expose_secret()));
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }

        let response = self
            .http
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CredentialError::Unavailable {
                service: token_url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Config {
                service: token_url.to_string(),
                reason: body,
            }
            .into());
        }
        if !status.is_success() {
            return Err(CredentialError::Unavailable {
                service: token_url.to_string(),
                reason: format!("status {status}"),
            }
            .into());
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| CredentialError::MalformedResponse {
                    service: token_url.to_string(),
                    reason: e.to_string(),
                })?;

        let expiry = body
            .expires_in
            .map(|secs| self.clock.now_utc() + ChronoDuration::seconds(secs));

        Ok(Token {
            value: SecretString::from(body.access_token),
            expiry,
            kind: TokenKind::ClientCredentials,
            refresh_token: body.refresh_token.map(SecretString::from),
        })
    }

    async fn login_password(
        &self,
        login_url: &str,
        username: &str,
        password: &SecretString,
        default_ttl: Duration,
    ) -> GatewayResult<Token> {
        let response = self
            .http
            .post(login_url)
            .json(&serde_json::json!({
                "username": username,
                "password": password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| CredentialError::Unavailable {
                service: login_url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 403 {
            return Err(CredentialError::Config {
                service: login_url.to_string(),
                reason: format!("status {status}"),
            }
            .into());
        }
        if !status.is_success() {
            return Err(CredentialError::Unavailable {
                service: login_url.to_string(),
                reason: format!("status {status}"),
            }
            .into());
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| CredentialError::MalformedResponse {
                    service: login_url.to_string(),
                    reason: e.to_string(),
                })?;

        // expiry parsed from the token if self-describing, else a configured default.
        let expiry = body
            .expires_in
            .map(|secs| self.clock.now_utc() + ChronoDuration::seconds(secs))
            .or_else(|| Some(self.clock.now_utc() + ChronoDuration::from_std(default_ttl).unwrap()));

        Ok(Token {
            value: SecretString::from(body.access_token),
            expiry,
            kind: TokenKind::PasswordBearer,
            refresh_token: body.refresh_token.map(SecretString::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::system_clock;

    #[tokio::test]
    async fn unconfigured_service_is_not_configured_error() {
        let store = CredentialStore::new(system_clock(), Duration::from_secs(300));
        let result = store.headers_for("unknown").await;
        assert!(matches!(
            result,
            Err(gateway_core::GatewayError::Credential(
                CredentialError::NotConfigured { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn static_bearer_materializes_without_network() {
        let store = CredentialStore::new(system_clock(), Duration::from_secs(300));
        store.register(ServiceConfig {
            service: "rge".into(),
            spec: CredentialSpec::StaticBearer {
                token: SecretString::from("fixed-token".to_string()),
                default_ttl: Duration::from_secs(60 * 60 * 24 * 30 * 6),
            },
            extra_headers: HashMap::new(),
        });
        let headers = store.headers_for("rge").await.unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer fixed-token");
    }

    #[tokio::test]
    async fn invalidate_drops_cached_token() {
        let store = CredentialStore::new(system_clock(), Duration::from_secs(300));
        store.register(ServiceConfig {
            service: "rge".into(),
            spec: CredentialSpec::StaticBearer {
                token: SecretString::from("fixed-token".to_string()),
                default_ttl: Duration::from_secs(60),
            },
            extra_headers: HashMap::new(),
        });
        store.headers_for("rge").await.unwrap();
        store.invalidate("rge").await.unwrap();
        let lock = store.state_lock("rge").unwrap();
        assert!(lock.lock().await.token.is_none());
    }

    #[tokio::test]
    async fn extra_headers_are_attached() {
        let store = CredentialStore::new(system_clock(), Duration::from_secs(300));
        let mut extra = HashMap::new();
        extra.insert("X-Recipient-Id".to_string(), "12345".to_string());
        store.register(ServiceConfig {
            service: "api_entreprise".into(),
            spec: CredentialSpec::StaticBearer {
                token: SecretString::from("tok".to_string()),
                default_ttl: Duration::from_secs(60),
            },
            extra_headers: extra,
        });
        let headers = store.headers_for("api_entreprise").await.unwrap();
        assert_eq!(headers.get("X-Recipient-Id").unwrap(), "12345");
    }
}
