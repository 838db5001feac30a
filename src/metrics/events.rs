//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a run and
//! implements `InternalEvent`, which records the corresponding Prometheus
//! metric. Events carry a `catalog` label so multi-catalog deployments get
//! per-catalog observability.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Records consumed from the current catalog stream.
pub struct RecordsProcessed {
    pub count: u64,
    pub catalog: String,
}

impl InternalEvent for RecordsProcessed {
    fn emit(self) {
        trace!(count = self.count, catalog = %self.catalog, "Records processed");
        counter!("drift_records_processed_total", "catalog" => self.catalog).increment(self.count);
    }
}

/// A change operation emitted by the diff merger.
pub struct OperationEmitted {
    /// "upsert", "partial_update", or "delete".
    pub kind: &'static str,
    pub catalog: String,
}

impl InternalEvent for OperationEmitted {
    fn emit(self) {
        trace!(kind = self.kind, catalog = %self.catalog, "Operation emitted");
        counter!("drift_operations_total", "kind" => self.kind, "catalog" => self.catalog)
            .increment(1);
    }
}

/// A chunk accepted by the remote service.
pub struct ChunkDelivered {
    pub records: u64,
    pub bytes: u64,
    pub catalog: String,
}

impl InternalEvent for ChunkDelivered {
    fn emit(self) {
        trace!(records = self.records, bytes = self.bytes, catalog = %self.catalog, "Chunk delivered");
        counter!("drift_chunks_sent_total", "catalog" => self.catalog.clone()).increment(1);
        counter!("drift_records_sent_total", "catalog" => self.catalog.clone())
            .increment(self.records);
        counter!("drift_bytes_sent_total", "catalog" => self.catalog).increment(self.bytes);
    }
}

/// A chunk that failed delivery on every candidate host.
pub struct ChunkFailed {
    pub records: u64,
    pub catalog: String,
}

impl InternalEvent for ChunkFailed {
    fn emit(self) {
        trace!(records = self.records, catalog = %self.catalog, "Chunk failed");
        counter!("drift_chunks_failed_total", "catalog" => self.catalog.clone()).increment(1);
        counter!("drift_records_failed_total", "catalog" => self.catalog).increment(self.records);
    }
}

/// One delivery round-trip completed (success or failure), with failover
/// time included.
pub struct DeliveryCompleted {
    pub duration: Duration,
    pub catalog: String,
}

impl InternalEvent for DeliveryCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            catalog = %self.catalog,
            "Delivery completed"
        );
        histogram!("drift_delivery_duration_seconds", "catalog" => self.catalog)
            .record(self.duration.as_secs_f64());
    }
}

/// A host was marked down after a server-side failure.
pub struct HostMarkedDown {
    pub host: String,
}

impl InternalEvent for HostMarkedDown {
    fn emit(self) {
        trace!(host = %self.host, "Host marked down");
        counter!("drift_hosts_marked_down_total", "host" => self.host).increment(1);
    }
}

/// A new snapshot was promoted to current.
pub struct SnapshotPromoted {
    pub records: u64,
    pub catalog: String,
}

impl InternalEvent for SnapshotPromoted {
    fn emit(self) {
        trace!(records = self.records, catalog = %self.catalog, "Snapshot promoted");
        counter!("drift_snapshots_promoted_total", "catalog" => self.catalog).increment(1);
    }
}

/// A run finished, successfully or not.
pub struct RunCompleted {
    pub success: bool,
    pub catalog: String,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        let status = if self.success { "success" } else { "failed" };
        trace!(status, catalog = %self.catalog, "Run completed");
        counter!("drift_runs_total", "status" => status, "catalog" => self.catalog).increment(1);
    }
}
