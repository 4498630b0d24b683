//! Fan-out & Fusion (C10): for a profile request, fingerprint, cache
//! lookup, single-flight, bounded parallel dispatch, precedence-ladder
//! merge, privacy redaction, metadata, cache write, audit append (spec §4.9).

use crate::merge::merge_ladder;
use dashmap::DashMap;
use gateway_analytics::AnalyticsStore;
use gateway_audit::AuditLedger;
use gateway_cache::{Freshness, KvCache};
use gateway_core::{
    cache_key, AuditEntry, BusinessEntity, CacheTtls, FanoutError, GatewayClock, GatewayResult,
    SharedClock,
};
use gateway_providers::{
    is_valid_association_id, AssociationsAdapter, CertificationsAdapter, RegistryAdapter,
    SearchAdapter, SearchFilters, TradeRegisterAdapter,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};

#[derive(Debug, Clone, Serialize)]
pub struct ProfileRequest {
    pub business_key: String,
    pub include_documents: bool,
    pub include_certifications: bool,
    pub force_refresh: bool,
}

#[derive(Debug, Clone)]
pub struct ProfileMetadata {
    pub sources: Vec<String>,
    pub response_time_ms: u64,
    pub data_freshness: chrono::DateTime<chrono::Utc>,
    pub completeness: f64,
}

#[derive(Debug, Clone)]
pub struct ProfileBundle {
    pub entity: BusinessEntity,
    pub metadata: ProfileMetadata,
    pub redaction: gateway_privacy::RedactionNotice,
}

pub struct FanoutEngine {
    cache: Arc<dyn KvCache>,
    analytics: Arc<dyn AnalyticsStore>,
    search: Arc<SearchAdapter>,
    registry: Arc<RegistryAdapter>,
    trade_register: Arc<TradeRegisterAdapter>,
    associations: Arc<AssociationsAdapter>,
    certifications: Arc<CertificationsAdapter>,
    audit: Arc<AuditLedger>,
    semaphore: Arc<Semaphore>,
    cache_ttls: CacheTtls,
    clock: SharedClock,
    inflight: DashMap<String, Arc<OnceCell<ProfileBundle>>>,
}

impl FanoutEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<dyn KvCache>,
        analytics: Arc<dyn AnalyticsStore>,
        search: Arc<SearchAdapter>,
        registry: Arc<RegistryAdapter>,
        trade_register: Arc<TradeRegisterAdapter>,
        associations: Arc<AssociationsAdapter>,
        certifications: Arc<CertificationsAdapter>,
        audit: Arc<AuditLedger>,
        fanout_concurrency: usize,
        cache_ttls: CacheTtls,
        clock: SharedClock,
    ) -> Self {
        Self {
            cache,
            analytics,
            search,
            registry,
            trade_register,
            associations,
            certifications,
            audit,
            semaphore: Arc::new(Semaphore::new(fanout_concurrency)),
            cache_ttls,
            clock,
            inflight: DashMap::new(),
        }
    }

    pub async fn fetch_profile(&self, request: ProfileRequest) -> GatewayResult<ProfileBundle> {
        let fingerprint = cache_key("profile", &request).0;

        let freshness = Freshness::from_force_refresh(request.force_refresh);
        if let Some(cached) = self.cache.get(&fingerprint, freshness).await? {
            if let Ok(bundle) = serde_json::from_value::<CachedBundle>(cached) {
                return Ok(bundle.into());
            }
        }

        let cell = self
            .inflight
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let fingerprint_for_init = fingerprint.clone();
        let result = cell
            .get_or_try_init(|| async { self.compute_profile(&request, &fingerprint_for_init).await })
            .await
            .map(|bundle| bundle.clone());

        self.inflight.remove(&fingerprint);
        result
    }

    async fn compute_profile(&self, request: &ProfileRequest, fingerprint: &str) -> GatewayResult<ProfileBundle> {
        let started = self.clock.now_monotonic();
        let key = request.business_key.as_str();
        let attempt_association = is_valid_association_id(key);

        let trade_register_task = async {
            let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
            self.trade_register.fetch_by_business_key(key).await
        };
        let registry_task = async {
            let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
            self.registry.fetch_by_business_key(key).await
        };
        let primary_search_task = async {
            let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
            self.search_exact(key).await
        };
        let associations_task = async {
            let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
            if attempt_association {
                self.associations.fetch_by_id(key).await
            } else {
                Err(gateway_core::ProviderError::NotFound {
                    provider: "associations".to_string(),
                }
                .into())
            }
        };

        let (trade_register, registry, primary_search, association) = tokio::join!(
            trade_register_task,
            registry_task,
            primary_search_task,
            associations_task
        );

        let mut attempts = 0usize;
        let mut successes = 0usize;
        let mut candidates: Vec<(&'static str, BusinessEntity)> = Vec::new();
        let outcomes: [(&'static str, GatewayResult<BusinessEntity>); 4] = [
            ("trade_register", trade_register),
            ("registry", registry),
            ("primary_search", primary_search),
            ("associations", association),
        ];
        for (source, outcome) in outcomes {
            attempts += 1;
            match outcome {
                Ok(entity) => {
                    successes += 1;
                    candidates.push((source, entity));
                }
                Err(e) => {
                    tracing::warn!(source, error = %e, "fan-out source failed");
                }
            }
        }

        if candidates.is_empty() {
            attempts += 1;
            let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
            match self.bulk_static_lookup(key).await {
                Ok(entity) => {
                    successes += 1;
                    candidates.push(("bulk_static", entity));
                }
                Err(e) => {
                    tracing::warn!(source = "bulk_static", error = %e, "fan-out source failed");
                }
            }
        }

        if candidates.is_empty() {
            return Err(FanoutError::AllSourcesFailed {
                fingerprint: fingerprint.to_string(),
                attempted: attempts,
            }
            .into());
        }

        // Order candidates by the fixed precedence ladder before merging.
        candidates.sort_by_key(|(name, _)| crate::merge::PRECEDENCE.iter().position(|p| p == name).unwrap_or(usize::MAX));
        let sources: Vec<String> = candidates.iter().map(|(name, _)| name.to_string()).collect();
        let mut entity = merge_ladder(candidates.into_iter().map(|(_, e)| e).collect()).expect("non-empty checked above");

        if request.include_certifications {
            if let Ok(certs) = self.certifications.fetch_valid(&request.business_key).await {
                if entity.certifications.is_empty() {
                    entity.certifications = certs;
                }
            }
        }

        let redaction = gateway_privacy::redact(&mut entity);

        let metadata = ProfileMetadata {
            sources,
            response_time_ms: self.clock.now_monotonic().duration_since(started).as_millis() as u64,
            data_freshness: entity.last_update,
            completeness: successes as f64 / attempts as f64,
        };

        let bundle = ProfileBundle {
            entity,
            metadata,
            redaction,
        };

        let cached = CachedBundle::from(&bundle);
        self.cache
            .set(fingerprint, serde_json::to_value(&cached).expect("bundle serializes"), self.cache_ttls.entity_profile)
            .await?;

        self.audit
            .log(AuditEntry {
                id: uuid::Uuid::new_v4(),
                timestamp: self.clock.now_utc(),
                tool: "get_entity_profile".to_string(),
                operation: "fetch_profile".to_string(),
                business_key: Some(request.business_key.clone()),
                caller_id: "system".to_string(),
                ip: None,
                response_time_ms: bundle.metadata.response_time_ms,
                status_code: 200,
                metadata: serde_json::json!({ "sources": bundle.metadata.sources, "completeness": bundle.metadata.completeness }),
            })
            .await?;

        Ok(bundle)
    }

    async fn search_exact(&self, business_key: &str) -> GatewayResult<BusinessEntity> {
        let results = self.search.search(business_key, &SearchFilters::default(), Some(1), 1).await?;
        results
            .into_iter()
            .find(|e| e.business_key == business_key)
            .ok_or_else(|| {
                gateway_core::ProviderError::NotFound {
                    provider: "primary_search".to_string(),
                }
                .into()
            })
    }

    async fn bulk_static_lookup(&self, business_key: &str) -> GatewayResult<BusinessEntity> {
        let rows = self
            .analytics
            .execute(
                "SELECT siren, name FROM entities WHERE siren = ?1",
                vec![serde_json::json!(business_key)],
            )
            .await?;
        let row = rows.first().ok_or_else(|| gateway_core::ProviderError::NotFound {
            provider: "bulk_static".to_string(),
        })?;
        let name = row.0.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        Ok(BusinessEntity {
            business_key: business_key.to_string(),
            establishment_key: None,
            display_name: name,
            legal_form: None,
            activity_code: None,
            size_bucket: gateway_core::SizeBucket::Unknown,
            creation_date: None,
            cessation_date: None,
            active: true,
            privacy: gateway_core::PrivacyFlag::Open,
            executives: Vec::new(),
            establishments: Vec::new(),
            financials: gateway_core::Financials::default(),
            certifications: Vec::new(),
            sources: std::collections::HashSet::from(["bulk_static".to_string()]),
            last_update: self.clock.now_utc(),
        })
    }

    /// Parallel primary-search + associations dispatch, deduped by business
    /// key keeping the higher-precedence record and filling its blanks from
    /// the lower one, sorted by relevance then display name, paginated
    /// client-side (spec §4.9 search-request paragraph).
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        offset: usize,
        limit: usize,
    ) -> GatewayResult<Vec<BusinessEntity>> {
        let is_association_query = is_valid_association_id(query);

        let (primary, associations) = tokio::join!(
            self.search.search(query, filters, None, 20),
            async {
                if is_association_query {
                    self.associations.search(query, None, 20).await
                } else {
                    Ok(Vec::new())
                }
            }
        );

        let mut results: Vec<BusinessEntity> = primary.unwrap_or_default();
        for entity in associations.unwrap_or_default() {
            match results.iter_mut().find(|e| e.business_key == entity.business_key) {
                Some(existing) => crate::merge::fill_missing(existing, &entity),
                None => results.push(entity),
            }
        }
        results.sort_by(|a, b| {
            let a_exact = a.display_name.eq_ignore_ascii_case(query);
            let b_exact = b.display_name.eq_ignore_ascii_case(query);
            b_exact.cmp(&a_exact).then_with(|| a.display_name.cmp(&b.display_name))
        });

        Ok(results.into_iter().skip(offset).take(limit).collect())
    }
}

/// JSON-friendly mirror of `ProfileBundle` for cache storage; `SharedClock`
/// monotonic timings are not meaningful once replayed from cache, so
/// `response_time_ms` is kept only as a historical value.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CachedBundle {
    entity: BusinessEntity,
    sources: Vec<String>,
    response_time_ms: u64,
    data_freshness: chrono::DateTime<chrono::Utc>,
    completeness: f64,
    redaction_rules: Vec<String>,
}

impl From<&ProfileBundle> for CachedBundle {
    fn from(bundle: &ProfileBundle) -> Self {
        Self {
            entity: bundle.entity.clone(),
            sources: bundle.metadata.sources.clone(),
            response_time_ms: bundle.metadata.response_time_ms,
            data_freshness: bundle.metadata.data_freshness,
            completeness: bundle.metadata.completeness,
            redaction_rules: bundle.redaction.rules_applied.clone(),
        }
    }
}

impl From<CachedBundle> for ProfileBundle {
    fn from(cached: CachedBundle) -> Self {
        Self {
            entity: cached.entity,
            metadata: ProfileMetadata {
                sources: cached.sources,
                response_time_ms: cached.response_time_ms,
                data_freshness: cached.data_freshness,
                completeness: cached.completeness,
            },
            redaction: gateway_privacy::RedactionNotice {
                rules_applied: cached.redaction_rules,
            },
        }
    }
}
