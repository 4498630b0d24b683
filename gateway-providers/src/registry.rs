//! Registry adapter (spec §4.8): full business-key lookups against the
//! legal-unit registry. The upstream wraps every response in a
//! `{statut, message, total}` header; `statut != 200` is a not-found only
//! when the message says so, otherwise it is an upstream error.

use chrono::NaiveDate;
use gateway_core::{
    Address, BusinessEntity, Establishment, Executive, Financials, GatewayClock, GatewayResult,
    LegalForm, PersonKind, PrivacyFlag, ProviderError, SharedClock, SizeBucket,
};
use gateway_http::{HttpCaller, HttpRequest, ProviderSpec};
use std::collections::HashSet;
use std::sync::Arc;

pub struct RegistryAdapter {
    caller: Arc<HttpCaller>,
    spec: ProviderSpec,
    clock: SharedClock,
}

impl RegistryAdapter {
    pub fn new(caller: Arc<HttpCaller>, spec: ProviderSpec, clock: SharedClock) -> Self {
        Self { caller, spec, clock }
    }

    pub async fn fetch_by_business_key(&self, key: &str) -> GatewayResult<BusinessEntity> {
        let body: serde_json::Value = self
            .caller
            .call_json(&self.spec, HttpRequest::get(&format!("/unites-legales/{key}")))
            .await?;

        let header = body.get("header").cloned().unwrap_or_default();
        let statut = header.get("statut").and_then(|v| v.as_i64()).unwrap_or(200);
        if statut != 200 {
            let message = header.get("message").and_then(|v| v.as_str()).unwrap_or_default();
            if message_signals_not_found(message) {
                return Err(ProviderError::NotFound {
                    provider: self.spec.name.clone(),
                }
                .into());
            }
            return Err(ProviderError::Upstream {
                provider: self.spec.name.clone(),
                reason: format!("statut={statut} message={message}"),
            }
            .into());
        }

        let unit = body.get("uniteLegale").ok_or_else(|| ProviderError::Upstream {
            provider: self.spec.name.clone(),
            reason: "response missing uniteLegale".to_string(),
        })?;

        normalize_unit(unit, self.clock.now_utc())
    }
}

fn message_signals_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("introuvable") || lower.contains("not found") || lower.contains("aucun résultat")
}

fn normalize_unit(
    unit: &serde_json::Value,
    now: chrono::DateTime<chrono::Utc>,
) -> GatewayResult<BusinessEntity> {
    let business_key = unit
        .get("siren")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Upstream {
            provider: "registry".to_string(),
            reason: "uniteLegale missing siren".to_string(),
        })?
        .to_string();

    let legal_form = unit.get("formeJuridique").and_then(|v| {
        Some(LegalForm {
            code: v.get("code")?.as_str()?.to_string(),
            label: v.get("libelle")?.as_str()?.to_string(),
        })
    });

    let protected = unit.get("diffusionStatut").and_then(|v| v.as_str()) == Some("P");

    let executives = unit
        .get("dirigeants")
        .and_then(|v| v.as_array())
        .map(|list| list.iter().filter_map(normalize_executive).collect())
        .unwrap_or_default();

    let establishments = unit
        .get("etablissements")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|e| normalize_establishment(e, protected))
                .collect()
        })
        .unwrap_or_default();

    Ok(BusinessEntity {
        business_key,
        establishment_key: None,
        display_name: unit.get("denomination").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        legal_form,
        activity_code: unit.get("activitePrincipale").and_then(|v| v.as_str()).map(str::to_string),
        size_bucket: SizeBucket::Unknown,
        creation_date: parse_date(unit.get("dateCreation")),
        cessation_date: parse_date(unit.get("dateCessation")),
        active: unit.get("etatAdministratif").and_then(|v| v.as_str()).map(|s| s == "A").unwrap_or(true),
        privacy: if protected { PrivacyFlag::Protected } else { PrivacyFlag::Open },
        executives,
        establishments,
        financials: Financials::default(),
        certifications: Vec::new(),
        sources: HashSet::from(["registry".to_string()]),
        last_update: now,
    })
}

fn normalize_executive(raw: &serde_json::Value) -> Option<Executive> {
    let role = raw.get("qualite")?.as_str()?.to_string();
    let surname = raw.get("nom")?.as_str()?.to_string();
    let given_name = raw.get("prenom").and_then(|v| v.as_str()).map(str::to_string);
    let person_kind = if raw.get("personnePhysique").and_then(|v| v.as_bool()).unwrap_or(true) {
        PersonKind::Natural
    } else {
        PersonKind::Legal
    };
    // Upstream may send a full date; truncate to month precision per the
    // natural-person invariant (spec §3), the redactor re-checks this.
    let birth_date = raw
        .get("dateNaissance")
        .and_then(|v| v.as_str())
        .map(|s| s.chars().take(7).collect::<String>());
    Some(Executive {
        role,
        surname,
        given_name,
        birth_date,
        nationality: raw.get("nationalite").and_then(|v| v.as_str()).map(str::to_string),
        person_kind,
    })
}

fn normalize_establishment(raw: &serde_json::Value, protected: bool) -> Option<Establishment> {
    let establishment_key = raw.get("siret")?.as_str()?.to_string();
    let headquarters = raw.get("siege").and_then(|v| v.as_bool()).unwrap_or(false);
    let addr = raw.get("adresse");

    let street = if protected {
        None
    } else {
        addr.and_then(|a| {
            let numero = a.get("numeroVoie").and_then(|v| v.as_str()).unwrap_or("");
            let voie_type = a.get("typeVoie").and_then(|v| v.as_str()).unwrap_or("");
            let voie = a.get("voie").and_then(|v| v.as_str()).unwrap_or("");
            let joined = [numero, voie_type, voie].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        })
    };

    let geo = if protected {
        None
    } else {
        addr.and_then(|a| {
            let lat = a.get("latitude")?.as_f64()?;
            let lon = a.get("longitude")?.as_f64()?;
            Some(gateway_core::GeoPointEq::from(gateway_core::GeoPoint { lat, lon }))
        })
    };

    Some(Establishment {
        establishment_key,
        headquarters,
        address: Address {
            street,
            postal_code: addr.and_then(|a| a.get("codePostal")).and_then(|v| v.as_str()).unwrap_or("").to_string(),
            city: addr.and_then(|a| a.get("commune")).and_then(|v| v.as_str()).unwrap_or("").to_string(),
            geo,
        },
        size_bucket: SizeBucket::Unknown,
        activity_code: raw.get("activitePrincipale").and_then(|v| v.as_str()).map(str::to_string),
    })
}

fn parse_date(value: Option<&serde_json::Value>) -> Option<NaiveDate> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_is_detected() {
        assert!(message_signals_not_found("SIREN introuvable"));
        assert!(!message_signals_not_found("internal error"));
    }

    #[test]
    fn normalize_unit_builds_headquarters_and_executives() {
        let unit = serde_json::json!({
            "siren": "123456789",
            "denomination": "Acme SAS",
            "diffusionStatut": "O",
            "dirigeants": [{"qualite": "Président", "nom": "Dupont", "prenom": "Jean", "personnePhysique": true}],
            "etablissements": [{"siret": "12345678900011", "siege": true, "adresse": {"codePostal": "75002", "commune": "Paris"}}],
        });
        let entity = normalize_unit(&unit, chrono::Utc::now()).unwrap();
        assert_eq!(entity.executives.len(), 1);
        assert!(entity.establishments[0].headquarters);
        assert_eq!(entity.privacy, PrivacyFlag::Open);
    }

    #[test]
    fn protected_diffusion_strips_street_and_geo() {
        let unit = serde_json::json!({
            "siren": "123456789",
            "denomination": "Acme SAS",
            "diffusionStatut": "P",
            "etablissements": [{"siret": "12345678900011", "siege": true, "adresse": {"numeroVoie": "12", "voie": "RUE X", "codePostal": "75002", "commune": "Paris", "latitude": 48.8, "longitude": 2.3}}],
        });
        let entity = normalize_unit(&unit, chrono::Utc::now()).unwrap();
        assert_eq!(entity.privacy, PrivacyFlag::Protected);
        assert!(entity.establishments[0].address.street.is_none());
        assert!(entity.establishments[0].address.geo.is_none());
    }
}
