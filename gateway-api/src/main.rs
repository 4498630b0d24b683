//! Boots the tool-surface binary: configuration, storage, credentials,
//! adapters, fan-out engine, ingestion scheduler, then serves the router
//! until `SIGINT` (spec §6 "Exit codes").

use gateway_api::{build_router, AppState};
use gateway_audit::AuditLedger;
use gateway_cache::LmdbKvCache;
use gateway_analytics::SqliteAnalyticsStore;
use gateway_core::{system_clock, GatewayConfig};
use gateway_credentials::{CredentialSpec, CredentialStore, ServiceConfig};
use gateway_fanout::FanoutEngine;
use gateway_http::{HttpCaller, ProviderSpec};
use gateway_ingest::{IngestJob, IngestScheduler};
use gateway_providers::{
    AnnouncementsAdapter, AssociationsAdapter, CertificationsAdapter, RegistryAdapter,
    SearchAdapter, TradeRegisterAdapter,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
use config::ProviderEnvConfig;

const EXIT_BAD_CONFIG: i32 = 2;
const EXIT_AUTH_UNRECOVERABLE: i32 = 3;
const EXIT_STORAGE_INIT_FAILED: i32 = 4;
const EXIT_NETWORK_INIT_FAILED: i32 = 5;

fn fail(code: i32, context: &str, error: impl std::fmt::Display) -> ! {
    tracing::error!(%error, context, "fatal error during boot");
    std::process::exit(code);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => fail(EXIT_BAD_CONFIG, "loading GatewayConfig", e),
    };
    if let Err(e) = config.validate() {
        fail(EXIT_BAD_CONFIG, "validating GatewayConfig", e);
    }
    let provider_env = match ProviderEnvConfig::from_env() {
        Ok(provider_env) => provider_env,
        Err(e) => fail(EXIT_BAD_CONFIG, "loading provider connection details", e),
    };
    let config = Arc::new(config);

    let clock = system_clock();

    let cache: Arc<dyn gateway_cache::KvCache> = match LmdbKvCache::open(kv_path(&config.kv_url), 1024, clock.clone()) {
        Ok(cache) => Arc::new(cache),
        Err(e) => fail(EXIT_STORAGE_INIT_FAILED, "opening the kv cache", e),
    };
    let analytics: Arc<dyn gateway_analytics::AnalyticsStore> =
        match SqliteAnalyticsStore::open(&config.analytic_store_path, clock.clone()) {
            Ok(store) => Arc::new(store),
            Err(e) => fail(EXIT_STORAGE_INIT_FAILED, "opening the analytic store", e),
        };

    let credentials = Arc::new(CredentialStore::new(clock.clone(), config.credential_skew));
    register_credentials(&credentials, &provider_env);

    let limiter = Arc::new(gateway_resilience::RateLimiter::new(clock.clone()));
    let caller = Arc::new(HttpCaller::new(credentials.clone(), limiter, clock.clone()));

    let registry = Arc::new(RegistryAdapter::new(
        caller.clone(),
        provider_spec(&config, "registry", provider_env.registry_base_url.clone(), Some("registry")),
        clock.clone(),
    ));
    let trade_register = Arc::new(TradeRegisterAdapter::new(
        caller.clone(),
        provider_spec(&config, "trade_register", provider_env.trade_register_base_url.clone(), Some("trade_register")),
        clock.clone(),
    ));
    let search = Arc::new(SearchAdapter::new(
        caller.clone(),
        provider_spec(&config, "search", provider_env.search_base_url.clone(), Some("search")),
        clock.clone(),
    ));
    let certifications = Arc::new(CertificationsAdapter::new(
        caller.clone(),
        provider_spec(&config, "certifications", provider_env.certifications_base_url.clone(), Some("certifications")),
        clock.clone(),
    ));
    let associations = Arc::new(AssociationsAdapter::new(
        caller.clone(),
        provider_spec(&config, "associations", provider_env.associations_base_url.clone(), None),
        clock.clone(),
    ));
    let announcements = Arc::new(AnnouncementsAdapter::new(
        caller.clone(),
        provider_spec(&config, "announcements", provider_env.announcements_base_url.clone(), None),
    ));

    // A required provider whose credentials are rejected outright (not
    // merely unreachable) cannot recover without operator intervention.
    for service in ["registry", "trade_register", "search", "certifications"] {
        if let Err(e) = credentials.headers_for(service).await {
            if matches!(
                e,
                gateway_core::GatewayError::Credential(gateway_core::CredentialError::Config { .. })
            ) {
                fail(EXIT_AUTH_UNRECOVERABLE, "authenticating a required provider at boot", e);
            }
            tracing::warn!(service, error = %e, "provider unreachable at boot, will retry lazily");
        }
    }

    let audit = Arc::new(AuditLedger::new(
        PathBuf::from("./audit"),
        config.audit_flush_size,
        config.audit_flush_interval,
        clock.clone(),
    ));
    tokio::spawn(audit.clone().spawn_auto_flush());

    let fanout = Arc::new(FanoutEngine::new(
        cache.clone(),
        analytics.clone(),
        search,
        registry,
        trade_register.clone(),
        associations.clone(),
        certifications.clone(),
        audit.clone(),
        config.fanout_semaphore,
        config.cache_ttls.clone(),
        clock.clone(),
    ));

    let ingest = Arc::new(IngestScheduler::new(
        bulk_ingest_jobs(),
        analytics,
        cache,
        clock.clone(),
        PathBuf::from("./ingest-scratch"),
    ));
    tokio::spawn(ingest.clone().run_forever());

    let state = Arc::new(AppState {
        fanout,
        trade_register,
        associations,
        announcements,
        certifications,
        ingest,
        audit,
        config: config.clone(),
        clock,
    });

    let router = build_router(state);

    let addr: SocketAddr = match format!("{}:{}", config.api_bind, config.api_port).parse() {
        Ok(addr) => addr,
        Err(e) => fail(EXIT_NETWORK_INIT_FAILED, "parsing the bind address", e),
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => fail(EXIT_NETWORK_INIT_FAILED, "binding the listen socket", e),
    };
    tracing::info!(%addr, "gateway-api listening");

    let server = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>());
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
}

fn kv_path(kv_url: &str) -> String {
    kv_url
        .strip_prefix("file://")
        .map(str::to_string)
        .unwrap_or_else(|| if kv_url == "memory://" { "./cache".to_string() } else { kv_url.to_string() })
}

fn provider_spec(config: &GatewayConfig, name: &str, base_url: String, auth_service: Option<&str>) -> ProviderSpec {
    ProviderSpec {
        name: name.to_string(),
        base_url,
        auth_service: auth_service.map(str::to_string),
        rate_limit: config.provider_limits.clone(),
        breaker: config.breaker.clone(),
        retry: config.retry.clone(),
        timeout: config.http_timeout,
        document_timeout: config.document_timeout,
    }
}

/// Provider-to-credential-shape assignment (spec §4.1): two client-credentials
/// providers (registry, certifications), one password-login provider (the
/// trade register, which documents requiring a username/password exchange),
/// one static-bearer provider (unified search). Associations and
/// announcements are open data and need no authentication.
fn register_credentials(credentials: &CredentialStore, env: &ProviderEnvConfig) {
    credentials.register(ServiceConfig {
        service: "registry".to_string(),
        spec: CredentialSpec::ClientCredentials {
            token_url: format!("{}/oauth/token", env.registry_base_url),
            client_id: env.registry_client_id.clone(),
            client_secret: env.registry_client_secret.clone(),
            scope: None,
        },
        extra_headers: Default::default(),
    });
    credentials.register(ServiceConfig {
        service: "certifications".to_string(),
        spec: CredentialSpec::ClientCredentials {
            token_url: format!("{}/oauth/token", env.certifications_base_url),
            client_id: env.certifications_client_id.clone(),
            client_secret: env.certifications_client_secret.clone(),
            scope: None,
        },
        extra_headers: Default::default(),
    });
    credentials.register(ServiceConfig {
        service: "trade_register".to_string(),
        spec: CredentialSpec::PasswordLogin {
            login_url: format!("{}/login", env.trade_register_base_url),
            username: env.trade_register_username.clone(),
            password: env.trade_register_password.clone(),
            default_ttl: std::time::Duration::from_secs(3600),
        },
        extra_headers: Default::default(),
    });
    credentials.register(ServiceConfig {
        service: "search".to_string(),
        spec: CredentialSpec::StaticBearer {
            token: env.search_bearer_token.clone(),
            default_ttl: std::time::Duration::from_secs(60 * 60 * 24 * 365),
        },
        extra_headers: Default::default(),
    });
}

/// One ingestion job per bulk dataset (spec §4.11 / C12): the INSEE Sirene
/// stock export, BODACC's bulk announcement feed, the RNA association
/// export, and the RGE certification export.
fn bulk_ingest_jobs() -> Vec<IngestJob> {
    vec![
        IngestJob::new(
            "sirene_stock",
            "0 3 * * *",
            std::env::var("SIRENE_STOCK_URL").unwrap_or_default(),
            "entities",
        )
        .with_invalidate_patterns(vec!["search:*".to_string(), "profile:*".to_string()]),
        IngestJob::new(
            "bodacc_bulk",
            "0 4 * * *",
            std::env::var("BODACC_BULK_URL").unwrap_or_default(),
            "announcements",
        )
        .with_invalidate_patterns(vec!["announcements:*".to_string()]),
        IngestJob::new(
            "rna_bulk",
            "0 5 * * *",
            std::env::var("RNA_BULK_URL").unwrap_or_default(),
            "associations",
        )
        .with_invalidate_patterns(vec!["search:*".to_string()]),
        IngestJob::new(
            "rge_bulk",
            "0 6 * * *",
            std::env::var("RGE_BULK_URL").unwrap_or_default(),
            "certifications",
        )
        .with_invalidate_patterns(vec!["certifications:*".to_string()]),
    ]
}
