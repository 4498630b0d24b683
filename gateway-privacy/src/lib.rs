//! Privacy Redactor (C11): rule-driven removal/masking over canonical
//! records, applied depth-first with removals preceding masks.
//!
//! Built-in rules (spec §4.10):
//! 1. `privacy = protected` on a `BusinessEntity` removes `street, geo` from
//!    every establishment's address.
//! 2. A natural-person executive has its birth date masked to `YYYY-MM`
//!    precision (the canonical model carries no separate birth-place field,
//!    so there is nothing further to remove there).
//! 3. An upstream `diffusion = protected` flag is folded into the same
//!    `privacy` field by the provider adapters, so it is covered by rule 1.

use gateway_core::{BusinessEntity, PersonKind, PrivacyFlag};

/// Attached to a response when at least one rule fired, per spec §4.10.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionNotice {
    pub rules_applied: Vec<String>,
}

impl RedactionNotice {
    pub fn fired(&self) -> bool {
        !self.rules_applied.is_empty()
    }

    pub fn message(&self) -> Option<String> {
        if self.rules_applied.is_empty() {
            return None;
        }
        Some(format!(
            "redacted fields removed or masked by: {}",
            self.rules_applied.join(", ")
        ))
    }
}

/// Applies every built-in rule to `entity` in place and returns a notice
/// describing what fired. Idempotent: re-applying to an already-redacted
/// entity fires the same rules again (they are no-ops against data that is
/// already absent or already masked) without further loss.
pub fn redact(entity: &mut BusinessEntity) -> RedactionNotice {
    let mut notice = RedactionNotice::default();

    // Removals precede masks within one record.
    if entity.privacy == PrivacyFlag::Protected {
        let mut stripped = false;
        for establishment in &mut entity.establishments {
            if establishment.address.street.take().is_some() {
                stripped = true;
            }
            if establishment.address.geo.take().is_some() {
                stripped = true;
            }
        }
        if stripped {
            notice.rules_applied.push("protected_address_removal".to_string());
        }
    }

    let mut masked = false;
    for executive in &mut entity.executives {
        if executive.person_kind != PersonKind::Natural {
            continue;
        }
        if let Some(date) = &executive.birth_date {
            let truncated = mask_birth_date(date);
            if &truncated != date {
                masked = true;
            }
            executive.birth_date = Some(truncated);
        }
    }
    if masked {
        notice.rules_applied.push("natural_person_birth_date_mask".to_string());
    }

    notice
}

/// Truncates a birth date string to `YYYY-MM` precision; a no-op if it is
/// already at or below that precision.
fn mask_birth_date(date: &str) -> String {
    date.chars().take(7).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{Address, Establishment, Executive, Financials, SizeBucket};
    use std::collections::HashSet;

    fn entity_with(privacy: PrivacyFlag, street: Option<&str>) -> BusinessEntity {
        BusinessEntity {
            business_key: "123456789".to_string(),
            establishment_key: None,
            display_name: "Acme".to_string(),
            legal_form: None,
            activity_code: None,
            size_bucket: SizeBucket::Unknown,
            creation_date: None,
            cessation_date: None,
            active: true,
            privacy,
            executives: Vec::new(),
            establishments: vec![Establishment {
                establishment_key: "12345678900011".to_string(),
                headquarters: true,
                address: Address {
                    street: street.map(str::to_string),
                    postal_code: "75002".to_string(),
                    city: "Paris".to_string(),
                    geo: Some(gateway_core::GeoPointEq { lat_e6: 48_800_000, lon_e6: 2_300_000 }),
                },
                size_bucket: SizeBucket::Unknown,
                activity_code: None,
            }],
            financials: Financials::default(),
            certifications: Vec::new(),
            sources: HashSet::new(),
            last_update: chrono::Utc::now(),
        }
    }

    #[test]
    fn protected_entity_loses_street_and_geo() {
        let mut entity = entity_with(PrivacyFlag::Protected, Some("12 Rue de la Paix"));
        let notice = redact(&mut entity);
        assert!(notice.fired());
        assert!(entity.establishments[0].address.street.is_none());
        assert!(entity.establishments[0].address.geo.is_none());
        assert!(entity.has_valid_privacy_invariant());
    }

    #[test]
    fn open_entity_is_untouched() {
        let mut entity = entity_with(PrivacyFlag::Open, Some("12 Rue de la Paix"));
        let notice = redact(&mut entity);
        assert!(!notice.fired());
        assert!(entity.establishments[0].address.street.is_some());
    }

    #[test]
    fn redaction_is_idempotent() {
        let mut entity = entity_with(PrivacyFlag::Protected, Some("12 Rue de la Paix"));
        redact(&mut entity);
        let second = redact(&mut entity);
        assert!(entity.establishments[0].address.street.is_none());
        assert_eq!(second.rules_applied, vec!["protected_address_removal".to_string()]);
    }

    #[test]
    fn natural_person_birth_date_is_masked_to_month() {
        let mut entity = entity_with(PrivacyFlag::Open, None);
        entity.executives.push(Executive {
            role: "Président".to_string(),
            surname: "Dupont".to_string(),
            given_name: Some("Jean".to_string()),
            birth_date: Some("1975-03-12".to_string()),
            nationality: None,
            person_kind: PersonKind::Natural,
        });
        let notice = redact(&mut entity);
        assert!(notice.fired());
        assert_eq!(entity.executives[0].birth_date.as_deref(), Some("1975-03"));
    }

    #[test]
    fn legal_person_birth_date_is_left_alone() {
        let mut entity = entity_with(PrivacyFlag::Open, None);
        entity.executives.push(Executive {
            role: "Mandataire".to_string(),
            surname: "Holdco".to_string(),
            given_name: None,
            birth_date: Some("1975-03-12".to_string()),
            nationality: None,
            person_kind: PersonKind::Legal,
        });
        let notice = redact(&mut entity);
        assert!(!notice.fired());
        assert_eq!(entity.executives[0].birth_date.as_deref(), Some("1975-03-12"));
    }
}
