//! Trade-register adapter (spec §4.8): requires username/password login to
//! obtain a bearer; a 401 triggers exactly one re-login per in-flight
//! request before giving up.

use chrono::NaiveDate;
use gateway_core::{
    Address, BusinessEntity, Document, DocumentKind, DocumentPayload, Establishment, Financials,
    GatewayClock, GatewayError, GatewayResult, HttpCallerError, LegalForm, PrivacyFlag,
    ProviderError, SharedClock, SizeBucket,
};
use gateway_http::{HttpCaller, HttpRequest, ProviderSpec};
use std::collections::HashSet;
use std::sync::Arc;

pub struct TradeRegisterAdapter {
    caller: Arc<HttpCaller>,
    spec: ProviderSpec,
    clock: SharedClock,
}

impl TradeRegisterAdapter {
    pub fn new(caller: Arc<HttpCaller>, spec: ProviderSpec, clock: SharedClock) -> Self {
        Self { caller, spec, clock }
    }

    pub async fn fetch_by_business_key(&self, key: &str) -> GatewayResult<BusinessEntity> {
        let body: serde_json::Value = self.call_with_retry(HttpRequest::get(&format!("/companies/{key}"))).await?;
        normalize(&body, self.clock.now_utc())
    }

    pub async fn download_document(&self, key: &str, kind: DocumentKind, year: Option<i32>) -> GatewayResult<Document> {
        let path = match year {
            Some(y) => format!("/companies/{key}/documents/{}/{y}", document_kind_wire(kind)),
            None => format!("/companies/{key}/documents/{}", document_kind_wire(kind)),
        };
        let response = self
            .call_raw_with_retry(HttpRequest {
                method: gateway_http::Method::Get,
                path: &path,
                query: &[],
                json_body: None,
                document: true,
            })
            .await?;
        Ok(Document {
            business_key: key.to_string(),
            kind,
            year,
            size_bytes: response.bytes.len() as u64,
            mime_type: "application/pdf".to_string(),
            payload: DocumentPayload::Bytes(response.bytes),
            origin_provider: self.spec.name.clone(),
        })
    }

    pub async fn list_documents(&self, key: &str) -> GatewayResult<Vec<(DocumentKind, Option<i32>)>> {
        let body: serde_json::Value = self.call_with_retry(HttpRequest::get(&format!("/companies/{key}/documents"))).await?;
        let entries = body.get("documents").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(entries
            .iter()
            .filter_map(|e| {
                let kind = document_kind_from_wire(e.get("type")?.as_str()?)?;
                let year = e.get("year").and_then(|v| v.as_i64()).map(|n| n as i32);
                Some((kind, year))
            })
            .collect())
    }

    async fn call_with_retry<T: serde::de::DeserializeOwned>(&self, request: HttpRequest<'_>) -> GatewayResult<T> {
        match self.caller.call_json(&self.spec, clone_request(&request)).await {
            Err(GatewayError::HttpCaller(HttpCallerError::AuthExpired { .. })) => {
                self.caller.call_json(&self.spec, request).await
            }
            other => other,
        }
    }

    async fn call_raw_with_retry(&self, request: HttpRequest<'_>) -> GatewayResult<gateway_http::RawResponse> {
        match self.caller.call(&self.spec, clone_request(&request)).await {
            Err(GatewayError::HttpCaller(HttpCallerError::AuthExpired { .. })) => {
                self.caller.call(&self.spec, request).await
            }
            other => other,
        }
    }
}

fn clone_request<'a>(request: &HttpRequest<'a>) -> HttpRequest<'a> {
    HttpRequest {
        method: request.method,
        path: request.path,
        query: request.query,
        json_body: request.json_body.clone(),
        document: request.document,
    }
}

fn document_kind_wire(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Act => "actes",
        DocumentKind::Accounts => "comptes-annuels",
        DocumentKind::Statutes => "statuts",
        DocumentKind::Extract => "extrait",
        DocumentKind::FiscalCert => "attestation-fiscale",
        DocumentKind::SocialCert => "attestation-sociale",
    }
}

fn document_kind_from_wire(wire: &str) -> Option<DocumentKind> {
    match wire {
        "actes" => Some(DocumentKind::Act),
        "comptes-annuels" => Some(DocumentKind::Accounts),
        "statuts" => Some(DocumentKind::Statutes),
        "extrait" => Some(DocumentKind::Extract),
        "attestation-fiscale" => Some(DocumentKind::FiscalCert),
        "attestation-sociale" => Some(DocumentKind::SocialCert),
        _ => None,
    }
}

fn normalize(body: &serde_json::Value, now: chrono::DateTime<chrono::Utc>) -> GatewayResult<BusinessEntity> {
    let business_key = body
        .get("siren")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Upstream {
            provider: "trade_register".to_string(),
            reason: "response missing siren".to_string(),
        })?
        .to_string();

    let legal_form = body.get("formeJuridique").and_then(|v| v.as_str()).map(|label| LegalForm {
        code: String::new(),
        label: label.to_string(),
    });

    let establishment = body.get("siege").map(|siege| Establishment {
        establishment_key: siege.get("siret").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        headquarters: true,
        address: Address {
            street: siege.get("adresse").and_then(|v| v.as_str()).map(str::to_string),
            postal_code: siege.get("codePostal").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            city: siege.get("commune").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            geo: None,
        },
        size_bucket: SizeBucket::Unknown,
        activity_code: None,
    });

    Ok(BusinessEntity {
        business_key,
        establishment_key: None,
        display_name: body.get("denomination").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        legal_form,
        activity_code: None,
        size_bucket: SizeBucket::Unknown,
        creation_date: body
            .get("dateImmatriculation")
            .and_then(|v| v.as_str())
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        cessation_date: None,
        active: body.get("radiee").and_then(|v| v.as_bool()).map(|r| !r).unwrap_or(true),
        privacy: PrivacyFlag::Open,
        executives: Vec::new(),
        establishments: establishment.into_iter().collect(),
        financials: Financials::default(),
        certifications: Vec::new(),
        sources: HashSet::from(["trade_register".to_string()]),
        last_update: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_kind_wire_round_trips() {
        for kind in [
            DocumentKind::Act,
            DocumentKind::Accounts,
            DocumentKind::Statutes,
            DocumentKind::Extract,
            DocumentKind::FiscalCert,
            DocumentKind::SocialCert,
        ] {
            assert_eq!(document_kind_from_wire(document_kind_wire(kind)), Some(kind));
        }
    }

    #[test]
    fn normalize_reads_headquarters_establishment() {
        let body = serde_json::json!({
            "siren": "123456789",
            "denomination": "Acme SAS",
            "siege": {"siret": "12345678900011", "codePostal": "75002", "commune": "Paris"},
        });
        let entity = normalize(&body, chrono::Utc::now()).unwrap();
        assert_eq!(entity.establishments.len(), 1);
        assert!(entity.establishments[0].headquarters);
    }
}
