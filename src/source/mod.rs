//! Record stream source boundary.
//!
//! The catalog export and the previous snapshot both satisfy the same
//! contract: records arrive one at a time in ascending key order, and the
//! stream can be closed early (idempotently) when a run aborts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::error::{OpenSnafu, ParseSnafu, ReadSnafu, SourceError};
use crate::record::Record;

/// A forward-only stream of catalog records in ascending key order.
#[async_trait]
pub trait RecordStream: Send {
    /// Pull the next record, or `None` once the stream is exhausted.
    async fn next(&mut self) -> Result<Option<Record>, SourceError>;

    /// Release underlying resources. Safe to call more than once, and safe
    /// to call after partial consumption.
    async fn close(&mut self) -> Result<(), SourceError>;
}

/// Record stream over a line-delimited JSON file sorted by key.
///
/// Enforces the ascending-key contract while reading: an out-of-order key
/// means the export or snapshot is corrupt, and continuing would emit
/// garbage deltas.
pub struct NdjsonRecordStream {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_number: usize,
    last_key: Option<String>,
}

impl NdjsonRecordStream {
    /// Open a record stream over the given file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.context(OpenSnafu {
            path: path.display().to_string(),
        })?;

        Ok(Self {
            path,
            lines: Some(BufReader::new(file).lines()),
            line_number: 0,
            last_key: None,
        })
    }

    fn path_str(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl RecordStream for NdjsonRecordStream {
    async fn next(&mut self) -> Result<Option<Record>, SourceError> {
        loop {
            let Some(lines) = self.lines.as_mut() else {
                return Ok(None);
            };

            let line = lines.next_line().await;
            let line = line.context(ReadSnafu {
                path: self.path.display().to_string(),
            })?;

            let Some(line) = line else {
                self.lines = None;
                return Ok(None);
            };
            self.line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            let record: Record = serde_json::from_str(&line).context(ParseSnafu {
                path: self.path_str(),
                line: self.line_number,
            })?;

            if let Some(previous) = &self.last_key
                && record.key.as_str() <= previous.as_str()
            {
                return Err(SourceError::OutOfOrder {
                    path: self.path_str(),
                    key: record.key,
                    previous: previous.clone(),
                });
            }
            self.last_key = Some(record.key.clone());

            return Ok(Some(record));
        }
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        // Dropping the reader closes the file handle.
        self.lines = None;
        Ok(())
    }
}
