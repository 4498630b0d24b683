//! Tool catalog: the fixed set of nine named operations exposed to callers
//! (spec §6 "External interfaces").

use super::types::Tool;

pub fn get_available_tools() -> Vec<Tool> {
    vec![
        Tool {
            name: "search_entities".to_string(),
            description: "Search business entities by name or identifier across registries".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "page": {"type": "integer", "minimum": 1, "default": 1},
                    "per_page": {"type": "integer", "minimum": 1, "maximum": 25, "default": 25},
                    "filters": {"type": "object"},
                    "include_associations": {"type": "boolean", "default": false}
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "get_entity_profile".to_string(),
            description: "Fetch the merged canonical profile for a business key".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "business_key": {"type": "string"},
                    "include_establishments": {"type": "boolean", "default": false},
                    "include_documents": {"type": "boolean", "default": false},
                    "include_financials": {"type": "boolean", "default": false},
                    "include_certifications": {"type": "boolean", "default": false},
                    "include_bank_info": {"type": "boolean", "default": false}
                },
                "required": ["business_key"]
            }),
        },
        Tool {
            name: "download_document".to_string(),
            description: "Download a registry document (act, accounts, statutes, extract, fiscal or social certificate)".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "business_key": {"type": "string"},
                    "kind": {"type": "string", "enum": ["act", "accounts", "statutes", "extract", "fiscal_cert", "social_cert"]},
                    "year": {"type": "integer"},
                    "format": {"type": "string", "enum": ["bytes", "url"], "default": "bytes"}
                },
                "required": ["business_key", "kind"]
            }),
        },
        Tool {
            name: "list_documents".to_string(),
            description: "List documents available for a business key".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"business_key": {"type": "string"}},
                "required": ["business_key"]
            }),
        },
        Tool {
            name: "search_announcements".to_string(),
            description: "Search legal announcements by business key, name, kind or date range".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "business_key": {"type": "string"},
                    "name": {"type": "string"},
                    "kind": {"type": "string", "enum": ["sale", "creation", "collective_procedure", "accounts_filing", "correction"]},
                    "date_from": {"type": "string", "format": "date"},
                    "date_to": {"type": "string", "format": "date"},
                    "page": {"type": "integer", "minimum": 1, "default": 1},
                    "per_page": {"type": "integer", "minimum": 1, "maximum": 25, "default": 25}
                }
            }),
        },
        Tool {
            name: "get_entity_timeline".to_string(),
            description: "Chronological announcement timeline for a business key, flagging collective procedures".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"business_key": {"type": "string"}},
                "required": ["business_key"]
            }),
        },
        Tool {
            name: "check_financial_health".to_string(),
            description: "Summarize collective-procedure exposure into a LOW/MEDIUM/HIGH risk rating".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"business_key": {"type": "string"}},
                "required": ["business_key"]
            }),
        },
        Tool {
            name: "search_associations".to_string(),
            description: "Search the nonprofit associations registry by name and optional postal code".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "postal_code": {"type": "string"},
                    "page": {"type": "integer", "minimum": 1, "default": 1},
                    "per_page": {"type": "integer", "minimum": 1, "maximum": 25, "default": 25}
                },
                "required": ["query"]
            }),
        },
        Tool {
            name: "check_certifications".to_string(),
            description: "Fetch currently valid environmental/quality/social certifications for a business key".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "business_key": {"type": "string"},
                    "force_refresh": {"type": "boolean", "default": false}
                },
                "required": ["business_key"]
            }),
        },
    ]
}
