//! Run report: counters and timestamps for one synchronization run.
//!
//! The report is the operator surface for a run: exact records and chunks
//! sent vs. failed, plus a terminal error when the run did not complete.
//! It is persisted once at run end (or immediately on early abort) to
//! `{report_dir}/{job}.json`, last-write-wins, via temp file + rename so a
//! crash never leaves a torn report.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::fs;
use tracing::info;

use crate::error::{ReportCreateDirSnafu, ReportError, ReportSerializeSnafu, ReportWriteSnafu};

/// Counters and outcome of one synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Job identifier (the catalog name).
    pub job: String,
    /// Records consumed from the current catalog stream.
    pub processed_records: usize,
    /// Change operations produced by the diff.
    pub records_to_send: usize,
    /// Operations delivered successfully.
    pub records_sent: usize,
    /// Operations whose chunk ultimately failed delivery.
    pub records_failed: usize,
    /// Chunks delivered successfully.
    pub chunks_sent: usize,
    /// Chunks that failed delivery (including resend groups).
    pub chunks_failed: usize,
    /// True when the run terminated with an unrecoverable failure.
    pub error: bool,
    /// Terminal failure detail.
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Create a report at run start.
    pub fn start(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            processed_records: 0,
            records_to_send: 0,
            records_sent: 0,
            records_failed: 0,
            chunks_sent: 0,
            chunks_failed: 0,
            error: false,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record a successful chunk outcome. Called exactly once per chunk.
    pub fn chunk_sent(&mut self, records: usize) {
        self.chunks_sent += 1;
        self.records_sent += records;
    }

    /// Record a failed chunk outcome. Called exactly once per chunk.
    pub fn chunk_failed(&mut self, records: usize) {
        self.chunks_failed += 1;
        self.records_failed += records;
    }

    /// Mark the run as terminally failed.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = true;
        self.error_message = Some(message.into());
    }

    /// Stamp the end of the run.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// True when any chunk failed, even if the run itself completed.
    pub fn has_failures(&self) -> bool {
        self.chunks_failed > 0
    }
}

/// Persists run reports for operational tooling.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the persisted report for a job.
    pub fn path_for(&self, job: &str) -> PathBuf {
        self.dir.join(format!("{job}.json"))
    }

    /// Persist the report, replacing any previous one for the same job.
    pub async fn save(&self, report: &RunReport) -> Result<(), ReportError> {
        fs::create_dir_all(&self.dir)
            .await
            .context(ReportCreateDirSnafu {
                path: self.dir.display().to_string(),
            })?;

        let json = serde_json::to_vec_pretty(report).context(ReportSerializeSnafu)?;
        let path = self.path_for(&report.job);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, json).await.context(ReportWriteSnafu {
            path: tmp.display().to_string(),
        })?;
        fs::rename(&tmp, &path).await.context(ReportWriteSnafu {
            path: path.display().to_string(),
        })?;

        info!(
            job = %report.job,
            sent = report.records_sent,
            failed = report.records_failed,
            error = report.error,
            path = %path.display(),
            "Saved run report"
        );
        Ok(())
    }

    /// Load the last persisted report for a job, if any.
    pub async fn load(&self, job: &str) -> Option<RunReport> {
        let bytes = fs::read(self.path_for(job)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl AsRef<Path> for ReportStore {
    fn as_ref(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_counters_accumulate_per_chunk_outcome() {
        let mut report = RunReport::start("products");
        report.chunk_sent(100);
        report.chunk_sent(50);
        report.chunk_failed(25);

        assert_eq!(report.chunks_sent, 2);
        assert_eq!(report.records_sent, 150);
        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.records_failed, 25);
        assert!(report.has_failures());
        assert!(!report.error);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());

        let mut report = RunReport::start("products");
        report.chunk_sent(10);
        report.finish();
        store.save(&report).await.unwrap();

        let loaded = store.load("products").await.unwrap();
        assert_eq!(loaded.job, "products");
        assert_eq!(loaded.records_sent, 10);
        assert!(loaded.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());

        let mut first = RunReport::start("products");
        first.chunk_sent(1);
        store.save(&first).await.unwrap();

        let mut second = RunReport::start("products");
        second.fail("remote unavailable");
        store.save(&second).await.unwrap();

        let loaded = store.load("products").await.unwrap();
        assert!(loaded.error);
        assert_eq!(loaded.error_message.as_deref(), Some("remote unavailable"));
        assert_eq!(loaded.records_sent, 0);
    }

    #[tokio::test]
    async fn test_load_missing_report_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(store.load("nope").await.is_none());
    }
}
