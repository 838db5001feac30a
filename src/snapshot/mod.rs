//! Snapshot persistence between runs.
//!
//! A snapshot is the full record set of the last successful run, stored as
//! line-delimited JSON sorted by key: `{snapshot_dir}/{catalog}.ndjson`.
//!
//! # Atomic promotion
//!
//! New snapshots use the write-new + rename-on-success pattern:
//! 1. Records stream into `{catalog}.ndjson.tmp` while the run diffs.
//! 2. `finalize()` flushes and renames to `{catalog}.ndjson`.
//!
//! The rename happens only after the run completes without aborting, so a
//! partially written snapshot can never replace the valid previous one.

use std::path::PathBuf;

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::error::{CreateDirSnafu, PromoteSnafu, SerializeSnafu, SnapshotError, SourceError, WriteSnafu};
use crate::record::Record;
use crate::source::{NdjsonRecordStream, RecordStream};

/// Filename suffix for a snapshot being written.
const PENDING_SUFFIX: &str = ".tmp";

/// Snapshot location for one catalog.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    catalog: String,
}

impl SnapshotStore {
    /// Create a store rooted at `dir` for the named catalog.
    pub fn new(dir: impl Into<PathBuf>, catalog: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            catalog: catalog.into(),
        }
    }

    /// Path of the current (promoted) snapshot.
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.ndjson", self.catalog))
    }

    /// Path of the pending snapshot being written.
    fn pending_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.ndjson{PENDING_SUFFIX}", self.catalog))
    }

    /// Open the previous run's snapshot for reading.
    ///
    /// Returns an empty stream when no snapshot exists yet (first run):
    /// every current record then diffs as an add.
    pub async fn reader(&self) -> Result<SnapshotReader, SourceError> {
        let path = self.current_path();
        match fs::try_exists(&path).await {
            Ok(true) => {
                debug!(catalog = %self.catalog, path = %path.display(), "Opening previous snapshot");
                Ok(SnapshotReader::File(NdjsonRecordStream::open(&path).await?))
            }
            _ => {
                debug!(catalog = %self.catalog, "No previous snapshot, starting from empty baseline");
                Ok(SnapshotReader::Empty)
            }
        }
    }

    /// Start writing the next snapshot.
    pub async fn writer(&self) -> Result<SnapshotWriter, SnapshotError> {
        fs::create_dir_all(&self.dir).await.context(CreateDirSnafu {
            path: self.dir.display().to_string(),
        })?;

        let pending = self.pending_path();
        let file = File::create(&pending).await.context(WriteSnafu {
            path: pending.display().to_string(),
        })?;

        Ok(SnapshotWriter {
            writer: BufWriter::new(file),
            pending,
            current: self.current_path(),
            catalog: self.catalog.clone(),
            records: 0,
        })
    }
}

/// Reader side of a snapshot: a sorted record stream, or empty on the
/// first run.
pub enum SnapshotReader {
    File(NdjsonRecordStream),
    Empty,
}

#[async_trait]
impl RecordStream for SnapshotReader {
    async fn next(&mut self) -> Result<Option<Record>, SourceError> {
        match self {
            SnapshotReader::File(stream) => stream.next().await,
            SnapshotReader::Empty => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        match self {
            SnapshotReader::File(stream) => stream.close().await,
            SnapshotReader::Empty => Ok(()),
        }
    }
}

/// Writer for the next snapshot, promoted atomically on `finalize`.
pub struct SnapshotWriter {
    writer: BufWriter<File>,
    pending: PathBuf,
    current: PathBuf,
    catalog: String,
    records: usize,
}

impl SnapshotWriter {
    /// Append one record to the pending snapshot.
    pub async fn write(&mut self, record: &Record) -> Result<(), SnapshotError> {
        let mut line = serde_json::to_vec(record).context(SerializeSnafu)?;
        line.push(b'\n');
        self.writer.write_all(&line).await.context(WriteSnafu {
            path: self.pending.display().to_string(),
        })?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Flush and atomically promote the pending snapshot to current.
    pub async fn finalize(mut self) -> Result<(), SnapshotError> {
        self.writer.flush().await.context(WriteSnafu {
            path: self.pending.display().to_string(),
        })?;
        self.writer.into_inner().sync_all().await.context(WriteSnafu {
            path: self.pending.display().to_string(),
        })?;

        fs::rename(&self.pending, &self.current)
            .await
            .context(PromoteSnafu {
                path: self.current.display().to_string(),
            })?;

        info!(
            catalog = %self.catalog,
            records = self.records,
            path = %self.current.display(),
            "Promoted snapshot"
        );
        Ok(())
    }

    /// Drop the pending snapshot without promoting it.
    ///
    /// Called when a run aborts; the previous snapshot stays current.
    pub async fn discard(self) {
        drop(self.writer);
        if let Err(e) = fs::remove_file(&self.pending).await {
            warn!(
                catalog = %self.catalog,
                path = %self.pending.display(),
                error = %e,
                "Failed to remove pending snapshot"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tempfile::TempDir;

    fn record(key: &str) -> Record {
        Record::new(key, Map::new())
    }

    #[tokio::test]
    async fn test_first_run_has_empty_reader() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "products");

        let mut reader = store.reader().await.unwrap();
        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_finalize_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "products");

        let mut writer = store.writer().await.unwrap();
        writer.write(&record("a")).await.unwrap();
        writer.write(&record("b")).await.unwrap();
        assert_eq!(writer.record_count(), 2);
        writer.finalize().await.unwrap();

        let mut reader = store.reader().await.unwrap();
        assert_eq!(reader.next().await.unwrap().unwrap().key, "a");
        assert_eq!(reader.next().await.unwrap().unwrap().key, "b");
        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_discard_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "products");

        // Establish a valid snapshot.
        let mut writer = store.writer().await.unwrap();
        writer.write(&record("a")).await.unwrap();
        writer.finalize().await.unwrap();

        // A second run writes and aborts.
        let mut writer = store.writer().await.unwrap();
        writer.write(&record("x")).await.unwrap();
        writer.discard().await;

        let mut reader = store.reader().await.unwrap();
        assert_eq!(reader.next().await.unwrap().unwrap().key, "a");
        assert!(reader.next().await.unwrap().is_none());
        assert!(!fs::try_exists(dir.path().join("products.ndjson.tmp"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unfinalized_snapshot_is_not_visible() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "products");

        let mut writer = store.writer().await.unwrap();
        writer.write(&record("a")).await.unwrap();
        // No finalize: the reader must still see an empty baseline.
        drop(writer);

        let mut reader = store.reader().await.unwrap();
        assert!(reader.next().await.unwrap().is_none());
    }
}
