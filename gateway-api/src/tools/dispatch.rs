//! Tool dispatch: extracts typed arguments from the raw JSON call envelope
//! and calls into the fan-out engine / provider adapters / ingestion
//! scheduler, mirroring the catalog's typed input/output contract (spec
//! §6).

use crate::auth::CallerContext;
use crate::error::ToolError;
use crate::state::AppState;
use chrono::NaiveDate;
use gateway_core::{AnnouncementKind, AuditEntry, DocumentKind};
use gateway_fanout::ProfileRequest;
use gateway_providers::{AnnouncementQuery, SearchFilters, Status};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Serialize)]
struct Pagination {
    total: usize,
    page: u32,
    per_page: u32,
    total_pages: u32,
}

impl Pagination {
    fn new(total: usize, page: u32, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let total_pages = (total as u32).div_ceil(per_page);
        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

fn field_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(Value::as_str)
}

fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    field_str(args, field).ok_or_else(|| ToolError::missing_field(field))
}

fn page_and_per_page(args: &Value) -> (u32, u32) {
    let page = args.get("page").and_then(Value::as_u64).unwrap_or(1).max(1) as u32;
    let per_page = args
        .get("per_page")
        .and_then(Value::as_u64)
        .unwrap_or(25)
        .clamp(1, 25) as u32;
    (page, per_page)
}

fn parse_filters(args: &Value) -> SearchFilters {
    let Some(filters) = args.get("filters") else {
        return SearchFilters::default();
    };
    SearchFilters {
        activity_code: filters.get("activity_code").and_then(Value::as_str).map(str::to_string),
        postal_code: filters.get("postal_code").and_then(Value::as_str).map(str::to_string),
        department: filters.get("department").and_then(Value::as_str).map(str::to_string),
        size_bucket: None,
        status: match filters.get("status").and_then(Value::as_str) {
            Some("ceased") => Status::Ceased,
            Some("all") => Status::All,
            _ => Status::Active,
        },
    }
}

fn parse_announcement_kind(s: &str) -> Option<AnnouncementKind> {
    match s {
        "sale" => Some(AnnouncementKind::Sale),
        "creation" => Some(AnnouncementKind::Creation),
        "collective_procedure" => Some(AnnouncementKind::CollectiveProcedure),
        "accounts_filing" => Some(AnnouncementKind::AccountsFiling),
        "correction" => Some(AnnouncementKind::Correction),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_document_kind(s: &str) -> Option<DocumentKind> {
    match s {
        "act" => Some(DocumentKind::Act),
        "accounts" => Some(DocumentKind::Accounts),
        "statutes" => Some(DocumentKind::Statutes),
        "extract" => Some(DocumentKind::Extract),
        "fiscal_cert" => Some(DocumentKind::FiscalCert),
        "social_cert" => Some(DocumentKind::SocialCert),
        _ => None,
    }
}

pub async fn execute_tool(
    state: &Arc<AppState>,
    caller: &CallerContext,
    name: &str,
    args: &Value,
) -> Result<Value, ToolError> {
    match name {
        "search_entities" => search_entities(state, caller, args).await,
        "get_entity_profile" => get_entity_profile(state, caller, args).await,
        "download_document" => download_document(state, caller, args).await,
        "list_documents" => list_documents(state, caller, args).await,
        "search_announcements" => search_announcements(state, caller, args).await,
        "get_entity_timeline" => get_entity_timeline(state, caller, args).await,
        "check_financial_health" => check_financial_health(state, caller, args).await,
        "search_associations" => search_associations(state, caller, args).await,
        "check_certifications" => check_certifications(state, caller, args).await,
        other => Err(ToolError::unknown_tool(other)),
    }
}

async fn audit(state: &Arc<AppState>, caller: &CallerContext, tool: &str, business_key: Option<String>, started: std::time::Instant, status_code: u16) {
    let entry = AuditEntry {
        id: uuid::Uuid::new_v4(),
        timestamp: state.clock.now_utc(),
        tool: tool.to_string(),
        operation: tool.to_string(),
        business_key,
        caller_id: caller.caller_id.clone(),
        ip: caller.ip.clone(),
        response_time_ms: started.elapsed().as_millis() as u64,
        status_code,
        metadata: serde_json::json!({}),
    };
    if let Err(e) = state.audit.log(entry).await {
        tracing::warn!(tool, error = %e, "failed to append audit entry");
    }
}

/// Merged result window the fan-out layer produces before client-side
/// pagination (spec §4.8: "paginate the merged list client-side after the
/// limit-per-source").
const MERGED_WINDOW: usize = 100;

async fn search_entities(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let query = required_str(args, "query")?;
    let (page, per_page) = page_and_per_page(args);
    let filters = parse_filters(args);

    let merged = state.fanout.search(query, &filters, 0, MERGED_WINDOW).await?;
    let total = merged.len();
    let offset = ((page - 1) * per_page) as usize;
    let results: Vec<_> = merged.into_iter().skip(offset).take(per_page as usize).collect();
    audit(state, caller, "search_entities", None, started, 200).await;

    Ok(serde_json::json!({
        "results": results,
        "pagination": Pagination::new(total, page, per_page),
    }))
}

async fn get_entity_profile(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let business_key = required_str(args, "business_key")?.to_string();
    let request = ProfileRequest {
        business_key: business_key.clone(),
        include_documents: args.get("include_documents").and_then(Value::as_bool).unwrap_or(false),
        include_certifications: args.get("include_certifications").and_then(Value::as_bool).unwrap_or(false),
        force_refresh: false,
    };
    let bundle = state.fanout.fetch_profile(request).await?;
    audit(state, caller, "get_entity_profile", Some(business_key), started, 200).await;

    Ok(serde_json::json!({
        "entity": bundle.entity,
        "metadata": {
            "sources": bundle.metadata.sources,
            "response_time_ms": bundle.metadata.response_time_ms,
            "completeness": bundle.metadata.completeness,
        },
        "redaction": bundle.redaction.message(),
    }))
}

async fn download_document(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let business_key = required_str(args, "business_key")?.to_string();
    let kind_str = required_str(args, "kind")?;
    let kind = parse_document_kind(kind_str).ok_or_else(|| ToolError::invalid_input(format!("unknown document kind '{kind_str}'")))?;
    let year = args.get("year").and_then(Value::as_i64).map(|y| y as i32);

    let document = state.trade_register.download_document(&business_key, kind, year).await?;
    audit(state, caller, "download_document", Some(business_key), started, 200).await;
    Ok(serde_json::to_value(document).expect("document serializes"))
}

async fn list_documents(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let business_key = required_str(args, "business_key")?.to_string();
    let documents = state.trade_register.list_documents(&business_key).await?;
    audit(state, caller, "list_documents", Some(business_key.clone()), started, 200).await;

    let entries: Vec<Value> = documents
        .iter()
        .map(|(kind, year)| serde_json::json!({"kind": kind, "year": year, "business_key": business_key}))
        .collect();
    Ok(serde_json::json!({"documents": entries, "total": documents.len()}))
}

async fn search_announcements(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let (page, per_page) = page_and_per_page(args);
    let query = AnnouncementQuery {
        business_key: field_str(args, "business_key").map(str::to_string),
        kind: field_str(args, "kind").and_then(parse_announcement_kind),
        from: field_str(args, "date_from").and_then(parse_date),
        to: field_str(args, "date_to").and_then(parse_date),
    };

    let mut announcements = state.announcements.search(&query, None, 50).await?;
    if let Some(name) = field_str(args, "name") {
        let lower = name.to_lowercase();
        announcements.retain(|a| a.title.to_lowercase().contains(&lower) || a.free_text.to_lowercase().contains(&lower));
    }
    let total = announcements.len();
    let offset = ((page - 1) * per_page) as usize;
    let page_items: Vec<_> = announcements.into_iter().skip(offset).take(per_page as usize).collect();

    audit(state, caller, "search_announcements", query.business_key.clone(), started, 200).await;
    Ok(serde_json::json!({
        "total": total,
        "announcements": page_items,
        "pagination": Pagination::new(total, page, per_page),
    }))
}

async fn get_entity_timeline(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let business_key = required_str(args, "business_key")?.to_string();
    let query = AnnouncementQuery {
        business_key: Some(business_key.clone()),
        kind: None,
        from: None,
        to: None,
    };
    let mut timeline = state.announcements.search(&query, None, 50).await?;
    timeline.sort_by_key(|a| a.publication_date);
    let has_collective_procedures = timeline.iter().any(|a| a.kind == AnnouncementKind::CollectiveProcedure);

    audit(state, caller, "get_entity_timeline", Some(business_key), started, 200).await;
    Ok(serde_json::json!({
        "total": timeline.len(),
        "timeline": timeline,
        "has_collective_procedures": has_collective_procedures,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum Risk {
    Low,
    Medium,
    High,
}

fn assess_risk(procedures_count: usize, has_recent: bool) -> Risk {
    if has_recent && procedures_count >= 2 {
        Risk::High
    } else if has_recent || procedures_count >= 1 {
        Risk::Medium
    } else {
        Risk::Low
    }
}

async fn check_financial_health(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let business_key = required_str(args, "business_key")?.to_string();
    let query = AnnouncementQuery {
        business_key: Some(business_key.clone()),
        kind: Some(AnnouncementKind::CollectiveProcedure),
        from: None,
        to: None,
    };
    let procedures = state.announcements.search(&query, None, 50).await?;
    let cutoff = state.clock.now_utc().date_naive() - chrono::Duration::days(730);
    let has_recent = procedures.iter().any(|a| a.publication_date >= cutoff);
    let risk = assess_risk(procedures.len(), has_recent);

    audit(state, caller, "check_financial_health", Some(business_key), started, 200).await;
    Ok(serde_json::json!({
        "procedures_count": procedures.len(),
        "has_recent": has_recent,
        "risk": risk,
    }))
}

async fn search_associations(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let query = required_str(args, "query")?;
    let (page, per_page) = page_and_per_page(args);

    let mut results = state.associations.search(query, None, 50).await?;
    if let Some(postal_code) = field_str(args, "postal_code") {
        results.retain(|e| e.establishments.iter().any(|est| est.address.postal_code == postal_code));
    }
    let total = results.len();
    let offset = ((page - 1) * per_page) as usize;
    let page_items: Vec<_> = results.into_iter().skip(offset).take(per_page as usize).collect();

    audit(state, caller, "search_associations", None, started, 200).await;
    Ok(serde_json::json!({
        "total": total,
        "associations": page_items,
        "pagination": Pagination::new(total, page, per_page),
    }))
}

async fn check_certifications(state: &Arc<AppState>, caller: &CallerContext, args: &Value) -> Result<Value, ToolError> {
    let started = std::time::Instant::now();
    let business_key = required_str(args, "business_key")?.to_string();
    let force_refresh = args.get("force_refresh").and_then(Value::as_bool).unwrap_or(false);

    let certifications = state.certifications.fetch_valid(&business_key).await?;
    let summary: std::collections::HashMap<String, usize> = certifications.iter().fold(std::collections::HashMap::new(), |mut acc, c| {
        *acc.entry(format!("{:?}", c.domain)).or_insert(0) += 1;
        acc
    });

    audit(state, caller, "check_certifications", Some(business_key), started, 200).await;
    Ok(serde_json::json!({
        "has": !certifications.is_empty(),
        "certifications": certifications,
        "summary": summary,
        "metadata": {"force_refresh": force_refresh},
    }))
}
