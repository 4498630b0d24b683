//! Certifications adapter (spec §4.8): RGE-style environmental/quality/
//! social certifications. A certification is valid iff its end date is
//! strictly in the future relative to now.

use chrono::NaiveDate;
use gateway_core::{Certification, CertificationDomain, Competency, GatewayClock, GatewayResult, SharedClock};
use gateway_http::{HttpCaller, HttpRequest, ProviderSpec};
use std::sync::Arc;

pub struct CertificationsAdapter {
    caller: Arc<HttpCaller>,
    spec: ProviderSpec,
    clock: SharedClock,
}

impl CertificationsAdapter {
    pub fn new(caller: Arc<HttpCaller>, spec: ProviderSpec, clock: SharedClock) -> Self {
        Self { caller, spec, clock }
    }

    pub async fn fetch_by_business_key(&self, key: &str) -> GatewayResult<Vec<Certification>> {
        let body: serde_json::Value = self
            .caller
            .call_json(&self.spec, HttpRequest::get(&format!("/certifications/{key}")))
            .await?;
        let rows = body.get("certifications").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(rows.iter().filter_map(normalize).collect())
    }

    /// Only the certifications still valid as of the adapter's clock.
    pub async fn fetch_valid(&self, key: &str) -> GatewayResult<Vec<Certification>> {
        let now = self.clock.now_utc().date_naive();
        Ok(self
            .fetch_by_business_key(key)
            .await?
            .into_iter()
            .filter(|c| c.is_valid(now))
            .collect())
    }
}

fn normalize(row: &serde_json::Value) -> Option<Certification> {
    let validity_end = NaiveDate::parse_from_str(row.get("date_fin")?.as_str()?, "%Y-%m-%d").ok()?;
    let domain = match row.get("domaine")?.as_str()? {
        "environnemental" => CertificationDomain::Environmental,
        "qualite" => CertificationDomain::Quality,
        "social" => CertificationDomain::Social,
        _ => return None,
    };
    let competencies = row
        .get("competences")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|c| {
                    Some(Competency {
                        code: c.get("code")?.as_str()?.to_string(),
                        label: c.get("libelle")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(Certification {
        type_tag: row.get("type")?.as_str()?.to_string(),
        code: row.get("code")?.as_str()?.to_string(),
        name: row.get("nom")?.as_str()?.to_string(),
        issuer: row.get("organisme")?.as_str()?.to_string(),
        validity_end,
        domain,
        competencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_reads_certification_fields() {
        let row = serde_json::json!({
            "type": "RGE",
            "code": "QUALIBAT-1234",
            "nom": "Qualibat RGE",
            "organisme": "Qualibat",
            "date_fin": "2099-01-01",
            "domaine": "environnemental",
            "competences": [{"code": "7131", "libelle": "Isolation thermique"}],
        });
        let cert = normalize(&row).unwrap();
        assert_eq!(cert.domain, CertificationDomain::Environmental);
        assert_eq!(cert.competencies.len(), 1);
        assert!(cert.is_valid(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
    }
}
