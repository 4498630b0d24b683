//! Announcements adapter (spec §4.8): BODACC-style legal announcements.
//! Query clauses are AND-joined; date bounds are inclusive; kind tags are
//! single letters (A=sale, B=creation, C=collective-procedure,
//! D=accounts-filing, P=correction).

use crate::pagination::{get_pages, PageInfo};
use chrono::NaiveDate;
use gateway_core::{Announcement, AnnouncementKind, GatewayResult};
use gateway_http::{HttpCaller, ProviderSpec};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct AnnouncementQuery {
    pub business_key: Option<String>,
    pub kind: Option<AnnouncementKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl AnnouncementQuery {
    /// Builds the AND-joined DSL clause list; date bounds are inclusive.
    fn clauses(&self) -> Vec<String> {
        let mut clauses = Vec::new();
        if let Some(key) = &self.business_key {
            clauses.push(format!("siren:{key}"));
        }
        if let Some(kind) = self.kind {
            clauses.push(format!("type:{}", kind.tag()));
        }
        if let Some(from) = self.from {
            clauses.push(format!("date>={}", from.format("%Y-%m-%d")));
        }
        if let Some(to) = self.to {
            clauses.push(format!("date<={}", to.format("%Y-%m-%d")));
        }
        clauses
    }
}

pub struct AnnouncementsAdapter {
    caller: Arc<HttpCaller>,
    spec: ProviderSpec,
}

impl AnnouncementsAdapter {
    pub fn new(caller: Arc<HttpCaller>, spec: ProviderSpec) -> Self {
        Self { caller, spec }
    }

    pub async fn search(
        &self,
        query: &AnnouncementQuery,
        max_pages: Option<u32>,
        per_page: u32,
    ) -> GatewayResult<Vec<Announcement>> {
        let dsl = query.clauses().join(" AND ");
        let base_query = vec![("q".to_string(), dsl)];

        let pages = get_pages(&self.caller, &self.spec, "/announcements", &base_query, max_pages, per_page, |body| {
            PageInfo {
                total_pages: body.get("total_pages").and_then(|v| v.as_u64()).map(|n| n as u32),
                next_is_null: body.get("next").is_some_and(|v| v.is_null()),
                has_more: body.get("has_more").and_then(|v| v.as_bool()),
            }
        })
        .await?;

        let mut announcements = Vec::new();
        for page in pages {
            let Some(results) = page.get("announcements").and_then(|v| v.as_array()) else {
                continue;
            };
            for row in results {
                if let Some(a) = normalize(row) {
                    announcements.push(a);
                }
            }
        }
        Ok(announcements)
    }
}

fn normalize(row: &serde_json::Value) -> Option<Announcement> {
    let announcement_id = row.get("id")?.as_str()?.to_string();
    let tag = row.get("type")?.as_str()?.chars().next()?;
    let kind = AnnouncementKind::from_tag(tag)?;
    let publication_date = NaiveDate::parse_from_str(row.get("date")?.as_str()?, "%Y-%m-%d").ok()?;

    Some(Announcement {
        announcement_id,
        kind,
        publication_date,
        court: row.get("tribunal").and_then(|v| v.as_str()).map(str::to_string),
        business_key: row.get("siren").and_then(|v| v.as_str()).map(str::to_string),
        title: row.get("titre").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        free_text: row.get("texte").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        pdf_url: row.get("pdf_url").and_then(|v| v.as_str()).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clauses_are_and_joined_with_inclusive_bounds() {
        let query = AnnouncementQuery {
            business_key: Some("123456789".to_string()),
            kind: Some(AnnouncementKind::Sale),
            from: NaiveDate::from_ymd_opt(2026, 1, 1),
            to: NaiveDate::from_ymd_opt(2026, 6, 30),
        };
        let clauses = query.clauses();
        assert_eq!(
            clauses,
            vec![
                "siren:123456789".to_string(),
                "type:A".to_string(),
                "date>=2026-01-01".to_string(),
                "date<=2026-06-30".to_string(),
            ]
        );
    }

    #[test]
    fn normalize_maps_single_letter_tag() {
        let row = serde_json::json!({
            "id": "bodacc-1",
            "type": "B",
            "date": "2026-02-01",
            "titre": "Création",
            "texte": "...",
        });
        let announcement = normalize(&row).unwrap();
        assert_eq!(announcement.kind, AnnouncementKind::Creation);
    }
}
