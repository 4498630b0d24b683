//! Primary search adapter (spec §4.8): free-text business search with
//! activity/postal/department/size/status filters.

use crate::pagination::{get_pages, PageInfo};
use chrono::NaiveDate;
use gateway_core::{
    BusinessEntity, Financials, GatewayClock, GatewayResult, PrivacyFlag, SharedClock, SizeBucket,
};
use gateway_http::{HttpCaller, ProviderSpec};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Active,
    Ceased,
    /// Maps to "no filter" on the wire (spec §4.8).
    All,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub activity_code: Option<String>,
    pub postal_code: Option<String>,
    pub department: Option<String>,
    pub size_bucket: Option<SizeBucket>,
    pub status: Status,
}

pub struct SearchAdapter {
    caller: std::sync::Arc<HttpCaller>,
    spec: ProviderSpec,
    clock: SharedClock,
}

impl SearchAdapter {
    pub fn new(caller: std::sync::Arc<HttpCaller>, spec: ProviderSpec, clock: SharedClock) -> Self {
        Self { caller, spec, clock }
    }

    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        max_pages: Option<u32>,
        per_page: u32,
    ) -> GatewayResult<Vec<BusinessEntity>> {
        let mut base_query = vec![("q".to_string(), query.to_string())];
        if let Some(code) = &filters.activity_code {
            base_query.push(("activite_principale".to_string(), code.clone()));
        }
        if let Some(code) = &filters.postal_code {
            base_query.push(("code_postal".to_string(), code.clone()));
        }
        if let Some(dep) = &filters.department {
            base_query.push(("departement".to_string(), dep.clone()));
        }
        if let Some(bucket) = &filters.size_bucket {
            base_query.push(("tranche_effectif".to_string(), size_bucket_wire(*bucket).to_string()));
        }
        match filters.status {
            Status::Active => base_query.push(("etat_administratif".to_string(), "A".to_string())),
            Status::Ceased => base_query.push(("etat_administratif".to_string(), "C".to_string())),
            Status::All => {}
        }

        let pages = get_pages(&self.caller, &self.spec, "/search", &base_query, max_pages, per_page, |body| {
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
            let Some(results) = page.get("results").and_then(|v| v.as_array()) else {
                continue;
            };
            for row in results {
                if let Some(entity) = normalize_row(row, now) {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }
}

fn size_bucket_wire(bucket: SizeBucket) -> &'static str {
    match bucket {
        SizeBucket::Micro => "micro",
        SizeBucket::Small => "pme",
        SizeBucket::Medium => "eti",
        SizeBucket::Large => "ge",
        SizeBucket::Unknown => "inconnu",
    }
}

fn normalize_row(row: &serde_json::Value, now: chrono::DateTime<chrono::Utc>) -> Option<BusinessEntity> {
    let business_key = row.get("siren")?.as_str()?.to_string();
    let display_name = row
        .get("nom_complet")
        .or_else(|| row.get("nom"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let activity_code = row.get("activite_principale").and_then(|v| v.as_str()).map(str::to_string);
    let creation_date = row
        .get("date_creation")
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
    let active = row
        .get("etat_administratif")
        .and_then(|v| v.as_str())
        .map(|s| s == "A")
        .unwrap_or(true);

    Some(BusinessEntity {
        business_key,
        establishment_key: None,
        display_name,
        legal_form: None,
        activity_code,
        size_bucket: SizeBucket::Unknown,
        creation_date,
        cessation_date: None,
        active,
        privacy: PrivacyFlag::Open,
        executives: Vec::new(),
        establishments: Vec::new(),
        financials: Financials::default(),
        certifications: Vec::new(),
        sources: HashSet::from(["primary_search".to_string()]),
        last_update: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_status_adds_no_filter() {
        let filters = SearchFilters {
            status: Status::All,
            ..Default::default()
        };
        assert_eq!(filters.status, Status::All);
    }

    #[test]
    fn normalize_row_reads_core_fields() {
        let row = serde_json::json!({
            "siren": "123456789",
            "nom_complet": "Acme SAS",
            "activite_principale": "62.01Z",
            "date_creation": "2020-01-15",
            "etat_administratif": "A",
        });
        let entity = normalize_row(&row, chrono::Utc::now()).unwrap();
        assert_eq!(entity.business_key, "123456789");
        assert_eq!(entity.display_name, "Acme SAS");
        assert!(entity.active);
        assert_eq!(entity.creation_date, NaiveDate::from_ymd_opt(2020, 1, 15));
    }
}
