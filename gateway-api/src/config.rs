//! Per-provider connection details (base URL and credentials), loaded from
//! plain (non `GATEWAY_*`) environment variables since these are operational
//! secrets for a specific upstream rather than gateway-wide tuning knobs
//! covered by `GatewayConfig::from_env`'s unknown-option check.

use gateway_core::{ConfigError, GatewayResult};
use secrecy::SecretString;

pub struct ProviderEnvConfig {
    pub registry_base_url: String,
    pub registry_client_id: String,
    pub registry_client_secret: SecretString,

    pub trade_register_base_url: String,
    pub trade_register_username: String,
    pub trade_register_password: SecretString,

    pub search_base_url: String,
    pub search_bearer_token: SecretString,

    pub certifications_base_url: String,
    pub certifications_client_id: String,
    pub certifications_client_secret: SecretString,

    pub associations_base_url: String,
    pub announcements_base_url: String,
}

fn required(key: &str) -> GatewayResult<String> {
    std::env::var(key).map_err(|_| {
        ConfigError::MissingRequired {
            field: key.to_string(),
        }
        .into()
    })
}

fn required_secret(key: &str) -> GatewayResult<SecretString> {
    required(key).map(SecretString::from)
}

impl ProviderEnvConfig {
    pub fn from_env() -> GatewayResult<Self> {
        Ok(Self {
            registry_base_url: required("REGISTRY_BASE_URL")?,
            registry_client_id: required("REGISTRY_CLIENT_ID")?,
            registry_client_secret: required_secret("REGISTRY_CLIENT_SECRET")?,

            trade_register_base_url: required("TRADE_REGISTER_BASE_URL")?,
            trade_register_username: required("TRADE_REGISTER_USERNAME")?,
            trade_register_password: required_secret("TRADE_REGISTER_PASSWORD")?,

            search_base_url: required("SEARCH_BASE_URL")?,
            search_bearer_token: required_secret("SEARCH_BEARER_TOKEN")?,

            certifications_base_url: required("CERTIFICATIONS_BASE_URL")?,
            certifications_client_id: required("CERTIFICATIONS_CLIENT_ID")?,
            certifications_client_secret: required_secret("CERTIFICATIONS_CLIENT_SECRET")?,

            associations_base_url: required("ASSOCIATIONS_BASE_URL")?,
            announcements_base_url: required("ANNOUNCEMENTS_BASE_URL")?,
        })
    }
}
