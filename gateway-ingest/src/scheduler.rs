//! Ingestion Scheduler (C12): minute-tick cron loop, overlap-guarded job
//! runs, streamed download with checksum verification, and atomic load
//! into the analytic store followed by dependent-cache invalidation.

use crate::job::IngestJob;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::StreamExt;
use gateway_analytics::AnalyticsStore;
use gateway_cache::KvCache;
use gateway_core::{GatewayClock, GatewayResult, IngestError, SharedClock};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub struct IngestScheduler {
    jobs: Vec<IngestJob>,
    analytics: Arc<dyn AnalyticsStore>,
    cache: Arc<dyn KvCache>,
    clock: SharedClock,
    client: reqwest::Client,
    scratch_dir: PathBuf,
    last_run: DashMap<String, DateTime<Utc>>,
    running: DashMap<String, bool>,
}

impl IngestScheduler {
    pub fn new(
        jobs: Vec<IngestJob>,
        analytics: Arc<dyn AnalyticsStore>,
        cache: Arc<dyn KvCache>,
        clock: SharedClock,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            jobs,
            analytics,
            cache,
            clock,
            client: reqwest::Client::new(),
            scratch_dir,
            last_run: DashMap::new(),
            running: DashMap::new(),
        }
    }

    /// Ticks once a minute, running every job whose cron expression fires
    /// within the elapsed window since the previous tick.
    pub async fn run_forever(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        let mut last_checked = self.clock.now_utc();
        loop {
            ticker.tick().await;
            let now = self.clock.now_utc();
            for job in &self.jobs {
                if is_due(&job.cron_expression, last_checked, now) {
                    let scheduler = self.clone();
                    let job = job.clone();
                    tokio::spawn(async move {
                        if let Err(e) = scheduler.run_job(&job, false).await {
                            tracing::warn!(job = %job.name, error = %e, "scheduled ingestion job failed");
                        }
                    });
                }
            }
            last_checked = now;
        }
    }

    pub async fn trigger(&self, name: &str, force: bool) -> GatewayResult<()> {
        let job = self
            .jobs
            .iter()
            .find(|j| j.name == name)
            .ok_or_else(|| IngestError::NotFound { name: name.to_string() })?;
        self.run_job(job, force).await
    }

    pub async fn force_update_all(&self) -> GatewayResult<()> {
        for job in &self.jobs {
            self.run_job(job, true).await?;
        }
        Ok(())
    }

    async fn run_job(&self, job: &IngestJob, force: bool) -> GatewayResult<()> {
        let already_running = self.running.insert(job.name.clone(), true).unwrap_or(false);
        if already_running {
            return Err(IngestError::AlreadyRunning { name: job.name.clone() }.into());
        }
        let result = self.run_job_inner(job, force).await;
        self.running.remove(&job.name);
        result
    }

    async fn run_job_inner(&self, job: &IngestJob, force: bool) -> GatewayResult<()> {
        if !force {
            if let Some(last) = self.last_run.get(&job.name) {
                if self.clock.now_utc() - *last < chrono::Duration::hours(24) {
                    tracing::debug!(job = %job.name, "skipping, still fresh");
                    return Ok(());
                }
            }
        }

        let scratch_path = self.scratch_dir.join(format!("{}.scratch", job.name));
        self.download(&job.source_url, &scratch_path, job.expected_hash.as_deref())
            .await?;

        let load_path = match &job.transform {
            Some(transform) => transform(&scratch_path)?,
            None => scratch_path.clone(),
        };

        let result = self
            .analytics
            .load_columnar(&load_path, &job.target_table, &job.source_url)
            .await;

        let _ = std::fs::remove_file(&scratch_path);
        if load_path != scratch_path {
            let _ = std::fs::remove_file(&load_path);
        }

        let loaded = result?;
        tracing::info!(job = %job.name, table = %job.target_table, rows = loaded, "ingestion job loaded rows");

        for pattern in &job.invalidate_patterns {
            self.cache.flush(pattern).await?;
        }

        self.last_run.insert(job.name.clone(), self.clock.now_utc());
        Ok(())
    }

    async fn download(&self, url: &str, dest: &std::path::Path, expected_hash: Option<&str>) -> GatewayResult<()> {
        let response = self.client.get(url).send().await.map_err(|e| IngestError::DownloadFailed {
            source_url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(IngestError::DownloadFailed {
                source_url: url.to_string(),
                reason: format!("upstream returned {}", response.status()),
            }
            .into());
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| IngestError::DownloadFailed {
                source_url: url.to_string(),
                reason: e.to_string(),
            })?;
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| IngestError::DownloadFailed {
            source_url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IngestError::DownloadFailed {
                source_url: url.to_string(),
                reason: e.to_string(),
            })?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(|e| IngestError::DownloadFailed {
                source_url: url.to_string(),
                reason: e.to_string(),
            })?;
        }
        file.flush().await.map_err(|e| IngestError::DownloadFailed {
            source_url: url.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(expected) = expected_hash {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(IngestError::ChecksumFailed {
                    source_url: url.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// `true` if `expr` (a standard 5-field cron expression) fires at least once
/// in `(since, until]`.
fn is_due(expr: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    let with_seconds = format!("0 {expr}");
    let schedule = match croniter_rs::Schedule::from_str(&with_seconds) {
        Ok(schedule) => schedule,
        Err(e) => {
            tracing::warn!(expr, error = %e, "invalid cron expression");
            return false;
        }
    };
    schedule.after(&since).next().is_some_and(|fire| fire <= until)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_minute_expression_is_always_due() {
        let now = Utc::now();
        assert!(is_due("* * * * *", now - chrono::Duration::minutes(1), now));
    }

    #[test]
    fn far_future_expression_is_not_due() {
        let now = Utc::now();
        assert!(!is_due("0 0 1 1 *", now - chrono::Duration::minutes(1), now));
    }

    #[test]
    fn invalid_expression_is_never_due() {
        let now = Utc::now();
        assert!(!is_due("not a cron", now - chrono::Duration::minutes(1), now));
    }
}
