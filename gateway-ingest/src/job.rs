//! Ingestion job configuration (spec §4.11).

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A function that rewrites a downloaded file into the shape
/// `AnalyticsStore::load_columnar` expects, returning the path to load from.
pub type Transform = Arc<dyn Fn(&Path) -> gateway_core::GatewayResult<PathBuf> + Send + Sync>;

#[derive(Clone)]
pub struct IngestJob {
    pub name: String,
    /// Standard 5-field cron expression (minute hour day-of-month month day-of-week).
    pub cron_expression: String,
    pub source_url: String,
    pub target_table: String,
    pub transform: Option<Transform>,
    pub expected_hash: Option<String>,
    /// Cache key globs to invalidate once the table swap lands, e.g. `search:*`.
    pub invalidate_patterns: Vec<String>,
}

impl IngestJob {
    pub fn new(name: impl Into<String>, cron_expression: impl Into<String>, source_url: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cron_expression: cron_expression.into(),
            source_url: source_url.into(),
            target_table: target_table.into(),
            transform: None,
            expected_hash: None,
            invalidate_patterns: Vec::new(),
        }
    }

    pub fn with_expected_hash(mut self, hash: impl Into<String>) -> Self {
        self.expected_hash = Some(hash.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_invalidate_patterns(mut self, patterns: Vec<String>) -> Self {
        self.invalidate_patterns = patterns;
        self
    }
}
