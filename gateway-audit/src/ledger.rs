//! Audit Ledger (C13): append buffer, periodic/size-triggered flush,
//! line-delimited JSON files, and filtered query.

use gateway_core::{AuditEntry, AuditError, GatewayClock, GatewayResult, SharedClock};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub tool: Option<String>,
    pub business_key: Option<String>,
    pub status_code: Option<u16>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(from) = self.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp > to {
                return false;
            }
        }
        if let Some(tool) = &self.tool {
            if &entry.tool != tool {
                return false;
            }
        }
        if let Some(key) = &self.business_key {
            if entry.business_key.as_deref() != Some(key.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status_code {
            if entry.status_code != status {
                return false;
            }
        }
        true
    }
}

/// Aggregated view over the audit trail (SPEC_FULL §11 supplemental
/// feature, grounded on `original_source/src/privacy/audit.py`'s
/// `generate_compliance_report`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplianceReport {
    pub total: u64,
    pub by_tool: HashMap<String, u64>,
    pub by_status: HashMap<u16, u64>,
}

pub struct AuditLedger {
    output_dir: PathBuf,
    flush_size: usize,
    flush_interval: Duration,
    buffer: Mutex<Vec<AuditEntry>>,
    clock: SharedClock,
}

impl AuditLedger {
    pub fn new(output_dir: PathBuf, flush_size: usize, flush_interval: Duration, clock: SharedClock) -> Self {
        Self {
            output_dir,
            flush_size,
            flush_interval,
            buffer: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Appends one entry; triggers a flush once the buffer reaches
    /// `flush_size` (spec §4.12 auto-flush condition).
    pub async fn log(&self, entry: AuditEntry) -> GatewayResult<()> {
        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(entry);
            buffer.len() >= self.flush_size
        };
        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Drains the buffer and writes it as one line-delimited JSON file. A
    /// no-op when the buffer is empty.
    pub async fn flush(&self) -> GatewayResult<()> {
        let entries = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        if entries.is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|e| AuditError::FlushFailed {
            reason: e.to_string(),
        })?;

        let filename = format!("audit_{}.jsonl", self.clock.now_utc().format("%Y%m%d_%H%M%S"));
        let path = self.output_dir.join(filename);
        let mut file = std::fs::File::create(&path).map_err(|e| AuditError::FlushFailed {
            reason: e.to_string(),
        })?;
        for entry in &entries {
            let line = serde_json::to_string(entry).map_err(|e| AuditError::FlushFailed {
                reason: e.to_string(),
            })?;
            writeln!(file, "{line}").map_err(|e| AuditError::FlushFailed {
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Runs `flush()` on a timer until the returned handle is aborted
    /// (spec §4.12's "periodic timer (default 60 s)"). Not started
    /// automatically by `new` so tests can drive flushing deterministically.
    pub fn spawn_auto_flush(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.flush_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.flush().await {
                    tracing::warn!(error = %e, "periodic audit flush failed");
                }
            }
        })
    }

    /// Matches against already-flushed files plus whatever is still
    /// buffered, so a query is never blind to not-yet-flushed entries.
    pub async fn query(&self, filter: &AuditFilter) -> GatewayResult<Vec<AuditEntry>> {
        let mut matched = Vec::new();

        if self.output_dir.is_dir() {
            let entries = std::fs::read_dir(&self.output_dir).map_err(|e| AuditError::FlushFailed {
                reason: e.to_string(),
            })?;
            for dir_entry in entries.flatten() {
                let path = dir_entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let contents = std::fs::read_to_string(&path).map_err(|e| AuditError::FlushFailed {
                    reason: e.to_string(),
                })?;
                for line in contents.lines() {
                    if let Ok(entry) = serde_json::from_str::<AuditEntry>(line) {
                        if filter.matches(&entry) {
                            matched.push(entry);
                        }
                    }
                }
            }
        }

        let buffer = self.buffer.lock().await;
        for entry in buffer.iter() {
            if filter.matches(entry) {
                matched.push(entry.clone());
            }
        }

        matched.sort_by_key(|e| e.timestamp);
        Ok(matched)
    }

    pub async fn generate_compliance_report(
        &self,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> GatewayResult<ComplianceReport> {
        let entries = self
            .query(&AuditFilter {
                from: Some(from),
                to: Some(to),
                ..Default::default()
            })
            .await?;

        let mut report = ComplianceReport::default();
        for entry in &entries {
            report.total += 1;
            *report.by_tool.entry(entry.tool.clone()).or_insert(0) += 1;
            *report.by_status.entry(entry.status_code).or_insert(0) += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::system_clock;

    fn entry(tool: &str, status: u16) -> AuditEntry {
        AuditEntry {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            tool: tool.to_string(),
            operation: "fetch".to_string(),
            business_key: Some("123456789".to_string()),
            caller_id: "caller-1".to_string(),
            ip: None,
            response_time_ms: 12,
            status_code: status,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn log_below_threshold_does_not_flush() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuditLedger::new(dir.path().to_path_buf(), 10, Duration::from_secs(60), system_clock());
        ledger.log(entry("search_entities", 200)).await.unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn log_at_threshold_flushes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuditLedger::new(dir.path().to_path_buf(), 2, Duration::from_secs(60), system_clock());
        ledger.log(entry("search_entities", 200)).await.unwrap();
        ledger.log(entry("search_entities", 200)).await.unwrap();
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn query_matches_flushed_and_buffered_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuditLedger::new(dir.path().to_path_buf(), 1, Duration::from_secs(60), system_clock());
        ledger.log(entry("search_entities", 200)).await.unwrap();
        ledger.log(entry("get_entity_profile", 500)).await.unwrap();

        let results = ledger
            .query(&AuditFilter {
                tool: Some("get_entity_profile".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status_code, 500);
    }

    #[tokio::test]
    async fn compliance_report_aggregates_by_tool_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuditLedger::new(dir.path().to_path_buf(), 1, Duration::from_secs(60), system_clock());
        ledger.log(entry("search_entities", 200)).await.unwrap();
        ledger.log(entry("search_entities", 200)).await.unwrap();
        ledger.log(entry("download_document", 404)).await.unwrap();

        let report = ledger
            .generate_compliance_report(chrono::Utc::now() - chrono::Duration::hours(1), chrono::Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.by_tool.get("search_entities"), Some(&2));
        assert_eq!(report.by_status.get(&404), Some(&1));
    }
}
