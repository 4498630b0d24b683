//! Associations adapter (spec §4.8): RNA-style nonprofit registry, keyed by
//! a nine-character identifier prefixed `W`.

use crate::pagination::{get_pages, PageInfo};
use chrono::NaiveDate;
use gateway_core::{
    BusinessEntity, Financials, GatewayClock, GatewayResult, PrivacyFlag, ProviderError,
    SharedClock, SizeBucket,
};
use gateway_http::{HttpCaller, ProviderSpec};
use std::collections::HashSet;
use std::sync::Arc;

static ASSOCIATION_ID: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"^W[0-9]{9}$").unwrap());

pub fn is_valid_association_id(id: &str) -> bool {
    ASSOCIATION_ID.is_match(id)
}

pub struct AssociationsAdapter {
    caller: Arc<HttpCaller>,
    spec: ProviderSpec,
    clock: SharedClock,
}

impl AssociationsAdapter {
    pub fn new(caller: Arc<HttpCaller>, spec: ProviderSpec, clock: SharedClock) -> Self {
        Self { caller, spec, clock }
    }

    pub async fn fetch_by_id(&self, id: &str) -> GatewayResult<BusinessEntity> {
        if !is_valid_association_id(id) {
            return Err(ProviderError::Upstream {
                provider: self.spec.name.clone(),
                reason: format!("'{id}' is not a valid W-prefixed association id"),
            }
            .into());
        }
        let body: serde_json::Value = self
            .caller
            .call_json(&self.spec, gateway_http::HttpRequest::get(&format!("/associations/{id}")))
            .await?;
        normalize(&body, self.clock.now_utc())
    }

    pub async fn search(&self, query: &str, max_pages: Option<u32>, per_page: u32) -> GatewayResult<Vec<BusinessEntity>> {
        let base_query = vec![("q".to_string(), query.to_string())];
        let pages = get_pages(&self.caller, &self.spec, "/associations", &base_query, max_pages, per_page, |body| {
            PageInfo {
                total_pages: body.get("total_pages").and_then(|v| v.as_u64()).map(|n| n as u32),
                next_is_null: body.get("next").is_some_and(|v| v.is_null()),
                has_more: body.get("has_more").and_then(|v| v.as_bool()),
            }
        })
        .await?;

        let now = self.clock.now_utc();
        let mut entities = Vec::new();
        for page in pages {
            let Some(results) = page.get("associations").and_then(|v| v.as_array()) else {
                continue;
            };
            for row in results {
                if let Ok(entity) = normalize(row, now) {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }
}

fn normalize(row: &serde_json::Value, now: chrono::DateTime<chrono::Utc>) -> GatewayResult<BusinessEntity> {
    let id = row
        .get("id_association")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Upstream {
            provider: "associations".to_string(),
            reason: "response missing id_association".to_string(),
        })?
        .to_string();

    Ok(BusinessEntity {
        business_key: id,
        establishment_key: None,
        display_name: row.get("titre").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        legal_form: None,
        activity_code: row.get("objet_social").and_then(|v| v.as_str()).map(str::to_string),
        size_bucket: SizeBucket::Unknown,
        creation_date: row
            .get("date_creation")
            .and_then(|v| v.as_str())
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        cessation_date: None,
        active: row.get("etat").and_then(|v| v.as_str()).map(|s| s != "dissoute").unwrap_or(true),
        privacy: PrivacyFlag::Open,
        executives: Vec::new(),
        establishments: Vec::new(),
        financials: Financials::default(),
        certifications: Vec::new(),
        sources: HashSet::from(["associations".to_string()]),
        last_update: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_w_prefixed_nine_digit_ids() {
        assert!(is_valid_association_id("W123456789"));
        assert!(!is_valid_association_id("X123456789"));
        assert!(!is_valid_association_id("W12345678"));
        assert!(!is_valid_association_id("W1234567890"));
    }

    #[test]
    fn normalize_reads_association_fields() {
        let row = serde_json::json!({
            "id_association": "W123456789",
            "titre": "Les Amis du Parc",
            "etat": "active",
        });
        let entity = normalize(&row, chrono::Utc::now()).unwrap();
        assert_eq!(entity.business_key, "W123456789");
        assert!(entity.active);
    }
}
