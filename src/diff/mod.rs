//! Sorted-merge diff between the current catalog and the last snapshot.
//!
//! Both inputs yield records in ascending key order, so the merger walks
//! them in lock-step with a single lookahead record per side and emits
//! change operations lazily. Memory use is O(1) in the record count.
//!
//! As a side effect, every record pulled from the current stream is
//! appended to the next snapshot: the current stream is assumed expensive
//! to re-read, so diffing and snapshot writing share one pass.

pub mod fields;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::SyncError;
use crate::record::Record;
use crate::snapshot::SnapshotWriter;
use crate::source::RecordStream;

/// A partial update: the key plus only the changed attribute subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    #[serde(rename = "objectID")]
    pub key: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A deletion by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRef {
    #[serde(rename = "objectID")]
    pub key: String,
}

/// One change operation, ordered by key within a run.
///
/// Serializes to the delivery wire shape:
/// `{"action": "upsert", "body": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "body", rename_all = "camelCase")]
pub enum ChangeOp {
    /// Insert-or-replace the full record.
    Upsert(Record),
    /// Replace only the changed fields (last-writer-wins per field).
    PartialUpdate(PartialRecord),
    /// Remove the record.
    Delete(DeleteRef),
}

impl ChangeOp {
    /// The record key this operation targets.
    pub fn key(&self) -> &str {
        match self {
            ChangeOp::Upsert(record) => &record.key,
            ChangeOp::PartialUpdate(partial) => &partial.key,
            ChangeOp::Delete(delete) => &delete.key,
        }
    }

    /// Short operation name for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeOp::Upsert(_) => "upsert",
            ChangeOp::PartialUpdate(_) => "partial_update",
            ChangeOp::Delete(_) => "delete",
        }
    }
}

/// Lock-step merger over the current and previous record streams.
pub struct DiffMerger<C, P> {
    current: C,
    previous: P,
    writer: SnapshotWriter,
    cur: Option<Record>,
    prev: Option<Record>,
    primed: bool,
    processed: usize,
}

impl<C: RecordStream, P: RecordStream> DiffMerger<C, P> {
    /// Create a merger; `writer` receives every current record.
    pub fn new(current: C, previous: P, writer: SnapshotWriter) -> Self {
        Self {
            current,
            previous,
            writer,
            cur: None,
            prev: None,
            primed: false,
            processed: 0,
        }
    }

    /// Number of current-stream records consumed so far.
    pub fn records_processed(&self) -> usize {
        self.processed
    }

    /// Pull the next change operation, or `None` when both streams are
    /// exhausted. Records with identical field values produce nothing.
    pub async fn next_op(&mut self) -> Result<Option<ChangeOp>, SyncError> {
        if !self.primed {
            self.advance_current().await?;
            self.advance_previous().await?;
            self.primed = true;
        }

        loop {
            match (self.cur.take(), self.prev.take()) {
                (None, None) => return Ok(None),

                // Only the current catalog has records left: adds.
                (Some(cur), None) => {
                    self.advance_current().await?;
                    return Ok(Some(ChangeOp::Upsert(cur)));
                }

                // Only the snapshot has records left: deletes.
                (None, Some(prev)) => {
                    self.advance_previous().await?;
                    return Ok(Some(ChangeOp::Delete(DeleteRef { key: prev.key })));
                }

                (Some(cur), Some(prev)) => match cur.key.cmp(&prev.key) {
                    std::cmp::Ordering::Less => {
                        self.prev = Some(prev);
                        self.advance_current().await?;
                        return Ok(Some(ChangeOp::Upsert(cur)));
                    }
                    std::cmp::Ordering::Greater => {
                        self.cur = Some(cur);
                        self.advance_previous().await?;
                        return Ok(Some(ChangeOp::Delete(DeleteRef { key: prev.key })));
                    }
                    std::cmp::Ordering::Equal => {
                        let changed = fields::diff_map(&cur.fields, &prev.fields);
                        let key = cur.key;
                        self.advance_current().await?;
                        self.advance_previous().await?;
                        if let Some(fields) = changed {
                            return Ok(Some(ChangeOp::PartialUpdate(PartialRecord {
                                key,
                                fields,
                            })));
                        }
                        // Identical record: emit nothing, keep merging.
                    }
                },
            }
        }
    }

    async fn advance_current(&mut self) -> Result<(), SyncError> {
        let next = self.current.next().await?;
        if let Some(record) = &next {
            self.writer.write(record).await?;
            self.processed += 1;
        }
        self.cur = next;
        Ok(())
    }

    async fn advance_previous(&mut self) -> Result<(), SyncError> {
        self.prev = self.previous.next().await?;
        Ok(())
    }

    /// Close both streams and hand back the snapshot writer for promotion.
    ///
    /// Call only after `next_op` has returned `None`. A close failure
    /// counts as a stream I/O failure: the pending snapshot is dropped.
    pub async fn finish(mut self) -> Result<SnapshotWriter, SyncError> {
        if let Err(e) = self.current.close().await {
            self.writer.discard().await;
            return Err(e.into());
        }
        if let Err(e) = self.previous.close().await {
            self.writer.discard().await;
            return Err(e.into());
        }
        Ok(self.writer)
    }

    /// Close both streams and drop the pending snapshot.
    ///
    /// Used when the run aborts; close failures are logged, not propagated,
    /// since the run is already failing.
    pub async fn abort(mut self) {
        if let Err(e) = self.current.close().await {
            warn!(error = %e, "Failed to close current stream during abort");
        }
        if let Err(e) = self.previous.close().await {
            warn!(error = %e, "Failed to close previous stream during abort");
        }
        self.writer.discard().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotStore;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::error::SourceError;

    /// In-memory sorted stream for merger tests.
    struct VecStream {
        records: std::vec::IntoIter<Record>,
        closed: bool,
    }

    impl VecStream {
        fn new(records: Vec<Record>) -> Self {
            Self {
                records: records.into_iter(),
                closed: false,
            }
        }
    }

    #[async_trait]
    impl RecordStream for VecStream {
        async fn next(&mut self) -> Result<Option<Record>, SourceError> {
            Ok(self.records.next())
        }

        async fn close(&mut self) -> Result<(), SourceError> {
            self.closed = true;
            Ok(())
        }
    }

    fn record(key: &str, fields: Value) -> Record {
        match fields {
            Value::Object(map) => Record::new(key, map),
            _ => panic!("expected object"),
        }
    }

    async fn writer(dir: &TempDir) -> SnapshotWriter {
        SnapshotStore::new(dir.path(), "test")
            .writer()
            .await
            .unwrap()
    }

    async fn collect_ops(current: Vec<Record>, previous: Vec<Record>) -> Vec<ChangeOp> {
        let dir = TempDir::new().unwrap();
        let mut merger = DiffMerger::new(
            VecStream::new(current),
            VecStream::new(previous),
            writer(&dir).await,
        );

        let mut ops = Vec::new();
        while let Some(op) = merger.next_op().await.unwrap() {
            ops.push(op);
        }
        ops
    }

    #[tokio::test]
    async fn test_disjoint_keys_emit_all_upserts_and_deletes() {
        let ops = collect_ops(
            vec![record("a", json!({})), record("c", json!({}))],
            vec![record("b", json!({})), record("d", json!({}))],
        )
        .await;

        let summary: Vec<(&str, String)> = ops
            .iter()
            .map(|op| (op.kind(), op.key().to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("upsert", "a".to_string()),
                ("delete", "b".to_string()),
                ("upsert", "c".to_string()),
                ("delete", "d".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_identical_records_emit_nothing() {
        let ops = collect_ops(
            vec![record("a", json!({"price": 1}))],
            vec![record("a", json!({"price": 1}))],
        )
        .await;
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn test_single_changed_field_emits_partial_update() {
        let ops = collect_ops(
            vec![record("a", json!({"price": 10, "name": "Anvil"}))],
            vec![record("a", json!({"price": 5, "name": "Anvil"}))],
        )
        .await;

        assert_eq!(ops.len(), 1);
        match &ops[0] {
            ChangeOp::PartialUpdate(partial) => {
                assert_eq!(partial.key, "a");
                assert_eq!(Value::Object(partial.fields.clone()), json!({"price": 10}));
            }
            other => panic!("expected PartialUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overlapping_catalogs_upsert_noop_delete() {
        // current = [A(10), B(5)], previous = [B(5), C(1)]
        let ops = collect_ops(
            vec![
                record("A", json!({"price": 10})),
                record("B", json!({"price": 5})),
            ],
            vec![
                record("B", json!({"price": 5})),
                record("C", json!({"price": 1})),
            ],
        )
        .await;

        let summary: Vec<(&str, String)> = ops
            .iter()
            .map(|op| (op.kind(), op.key().to_string()))
            .collect();
        assert_eq!(
            summary,
            vec![("upsert", "A".to_string()), ("delete", "C".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_streams_emit_nothing() {
        let ops = collect_ops(vec![], vec![]).await;
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn test_ops_are_in_ascending_key_order() {
        let ops = collect_ops(
            vec![
                record("a", json!({"v": 1})),
                record("c", json!({"v": 2})),
                record("e", json!({"v": 3})),
            ],
            vec![
                record("b", json!({"v": 1})),
                record("c", json!({"v": 9})),
                record("d", json!({"v": 1})),
            ],
        )
        .await;

        let keys: Vec<&str> = ops.iter().map(ChangeOp::key).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_idempotence_current_as_previous() {
        let records = vec![
            record("a", json!({"price": 1, "tags": ["x"]})),
            record("b", json!({"nested": {"deep": [1, 2]}})),
        ];
        let ops = collect_ops(records.clone(), records).await;
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_receives_every_current_record() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "test");
        let mut merger = DiffMerger::new(
            VecStream::new(vec![
                record("a", json!({"v": 1})),
                record("b", json!({"v": 2})),
            ]),
            VecStream::new(vec![record("a", json!({"v": 1}))]),
            store.writer().await.unwrap(),
        );

        while merger.next_op().await.unwrap().is_some() {}
        assert_eq!(merger.records_processed(), 2);

        let writer = merger.finish().await.unwrap();
        assert_eq!(writer.record_count(), 2);
        writer.finalize().await.unwrap();

        let mut reader = store.reader().await.unwrap();
        assert_eq!(reader.next().await.unwrap().unwrap().key, "a");
        assert_eq!(reader.next().await.unwrap().unwrap().key, "b");
        assert!(reader.next().await.unwrap().is_none());
    }

    #[test]
    fn test_change_op_wire_shape() {
        let upsert = ChangeOp::Upsert(record("a", json!({"price": 1})));
        assert_eq!(
            serde_json::to_value(&upsert).unwrap(),
            json!({"action": "upsert", "body": {"objectID": "a", "price": 1}})
        );

        let delete = ChangeOp::Delete(DeleteRef { key: "b".into() });
        assert_eq!(
            serde_json::to_value(&delete).unwrap(),
            json!({"action": "delete", "body": {"objectID": "b"}})
        );

        let partial = ChangeOp::PartialUpdate(PartialRecord {
            key: "c".into(),
            fields: match json!({"price": 2}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        });
        assert_eq!(
            serde_json::to_value(&partial).unwrap(),
            json!({"action": "partialUpdate", "body": {"objectID": "c", "price": 2}})
        );
    }
}
