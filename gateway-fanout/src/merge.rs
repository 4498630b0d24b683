//! Precedence-ladder merge (spec §4.9 step 7): highest-precedence source
//! wins on conflict, missing fields are filled from lower-priority sources.

use gateway_core::BusinessEntity;

/// Fixed precedence ladder, highest first.
pub const PRECEDENCE: [&str; 5] = ["trade_register", "registry", "primary_search", "associations", "bulk_static"];

/// Folds `filler` into `winner` in place: `winner`'s own fields are kept,
/// anything it is missing is filled from `filler`. Caller is responsible
/// for feeding sources in precedence order (highest first).
pub fn fill_missing(winner: &mut BusinessEntity, filler: &BusinessEntity) {
    if winner.legal_form.is_none() {
        winner.legal_form = filler.legal_form.clone();
    }
    if winner.activity_code.is_none() {
        winner.activity_code = filler.activity_code.clone();
    }
    if winner.creation_date.is_none() {
        winner.creation_date = filler.creation_date;
    }
    if winner.cessation_date.is_none() {
        winner.cessation_date = filler.cessation_date;
    }
    if winner.establishments.is_empty() {
        winner.establishments = filler.establishments.clone();
    }
    if winner.executives.is_empty() {
        winner.executives = filler.executives.clone();
    }
    if winner.financials.revenue.is_none() {
        winner.financials.revenue = filler.financials.revenue;
    }
    if winner.financials.fiscal_year.is_none() {
        winner.financials.fiscal_year = filler.financials.fiscal_year;
    }
    if winner.financials.headcount.is_none() {
        winner.financials.headcount = filler.financials.headcount;
    }
    if winner.certifications.is_empty() {
        winner.certifications = filler.certifications.clone();
    }
    winner.sources.extend(filler.sources.iter().cloned());
}

/// Merges a list of `(source_name, entity)` pairs already gathered in
/// precedence order into one entity. Returns `None` if nothing succeeded.
pub fn merge_ladder(mut candidates: Vec<BusinessEntity>) -> Option<BusinessEntity> {
    if candidates.is_empty() {
        return None;
    }
    let mut winner = candidates.remove(0);
    for filler in &candidates {
        fill_missing(&mut winner, filler);
    }
    Some(winner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{Financials, PrivacyFlag, SizeBucket};
    use std::collections::HashSet;

    fn bare(business_key: &str) -> BusinessEntity {
        BusinessEntity {
            business_key: business_key.to_string(),
            establishment_key: None,
            display_name: String::new(),
            legal_form: None,
            activity_code: None,
            size_bucket: SizeBucket::Unknown,
            creation_date: None,
            cessation_date: None,
            active: true,
            privacy: PrivacyFlag::Open,
            executives: Vec::new(),
            establishments: Vec::new(),
            financials: Financials::default(),
            certifications: Vec::new(),
            sources: HashSet::new(),
            last_update: chrono::Utc::now(),
        }
    }

    #[test]
    fn higher_precedence_wins_missing_fields_filled_from_lower() {
        let mut winner = bare("123456789");
        winner.legal_form = None;
        winner.display_name = "From Trade Register".to_string();

        let mut filler = bare("123456789");
        filler.legal_form = Some(gateway_core::LegalForm {
            code: "5710".to_string(),
            label: "SAS".to_string(),
        });
        filler.display_name = "From Registry".to_string();

        fill_missing(&mut winner, &filler);
        assert_eq!(winner.display_name, "From Trade Register");
        assert!(winner.legal_form.is_some());
    }

    #[test]
    fn merge_ladder_keeps_first_as_winner() {
        let a = bare("123456789");
        let b = bare("123456789");
        let merged = merge_ladder(vec![a, b]).unwrap();
        assert_eq!(merged.business_key, "123456789");
    }
}
