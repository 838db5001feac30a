//! Run orchestration: diff, batch, deliver, resend, promote, report.
//!
//! A run is a single logical worker: records and operations move in strict
//! key order through the merger, the batcher, and the delivery client, with
//! no parallel fan-out across chunks. Ordering and snapshot consistency
//! depend on that. Catalogs are independent of each other, so multiple
//! catalogs run as separate tokio tasks, each with its own streams, host
//! pool, and report.
//!
//! Failure policy: a failed chunk is absorbed into counters and queued for
//! the resend pass; the run itself only fails on stream I/O errors or when
//! the failed-chunk budget is exhausted. An aborted run never promotes its
//! pending snapshot.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chunk::{BatcherConfig, ChunkBatcher};
use crate::config::{CatalogConfig, Config};
use crate::delivery::{DeliveryClient, DeliveryTransport, HostPool, HttpTransport, subdivide};
use crate::diff::{ChangeOp, DiffMerger};
use crate::emit;
use crate::error::{SyncError, TooManyFailedChunksSnafu};
use crate::metrics::events::{
    ChunkDelivered, ChunkFailed, OperationEmitted, RecordsProcessed, RunCompleted,
    SnapshotPromoted,
};
use crate::report::{ReportStore, RunReport};
use crate::snapshot::SnapshotStore;
use crate::source::{NdjsonRecordStream, RecordStream};

/// Result of one catalog's run within a multi-catalog invocation.
pub struct RunOutcome {
    pub catalog: String,
    pub result: Result<RunReport, SyncError>,
}

/// Synchronize every configured catalog using the HTTP transport.
pub async fn run_all(config: Config) -> Result<Vec<RunOutcome>, SyncError> {
    let transport: Arc<dyn DeliveryTransport> = Arc::new(HttpTransport::new(
        config.delivery.timeout(),
        &config.delivery.application_id,
        &config.delivery.api_key,
    )?);
    run_all_with_transport(config, transport).await
}

/// Synchronize every configured catalog over the given transport.
///
/// Runs are independent: one catalog failing does not stop the others.
pub async fn run_all_with_transport(
    config: Config,
    transport: Arc<dyn DeliveryTransport>,
) -> Result<Vec<RunOutcome>, SyncError> {
    let config = Arc::new(config);

    let mut handles = Vec::new();
    for (catalog, catalog_cfg) in config.catalogs.clone() {
        let config = Arc::clone(&config);
        let transport = Arc::clone(&transport);
        handles.push((
            catalog.clone(),
            tokio::spawn(run_catalog(config, catalog, catalog_cfg, transport)),
        ));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (catalog, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(source) => Err(SyncError::TaskJoin { source }),
        };
        outcomes.push(RunOutcome { catalog, result });
    }
    Ok(outcomes)
}

/// Run one catalog synchronization end to end.
///
/// The report is persisted whether the run succeeds or fails; on failure
/// its `error`/`error_message` fields carry the cause and the previous
/// snapshot stays current.
pub async fn run_catalog(
    config: Arc<Config>,
    catalog: String,
    catalog_cfg: CatalogConfig,
    transport: Arc<dyn DeliveryTransport>,
) -> Result<RunReport, SyncError> {
    let delivery = &config.delivery;
    let hosts = HostPool::for_account(
        &delivery.application_id,
        &delivery.domain,
        delivery.host_cooldown(),
    );

    let mut run = CatalogRun {
        index: catalog_cfg.index_name(&catalog).to_string(),
        limit: delivery.max_failed_chunks,
        report: RunReport::start(&catalog),
        client: DeliveryClient::new(transport, hosts, catalog.clone()),
        failed_ops: Vec::new(),
        catalog,
    };

    info!(
        catalog = %run.catalog,
        source = %catalog_cfg.source,
        index = %run.index,
        "Starting catalog synchronization"
    );

    let result = run.execute(&config, &catalog_cfg).await;

    match &result {
        Ok(()) => info!(
            catalog = %run.catalog,
            processed = run.report.processed_records,
            sent = run.report.records_sent,
            failed = run.report.records_failed,
            "Catalog synchronization complete"
        ),
        Err(e) => {
            error!(catalog = %run.catalog, error = %e, "Catalog synchronization failed");
            run.report.fail(e.to_string());
        }
    }
    emit!(RunCompleted {
        success: result.is_ok(),
        catalog: run.catalog.clone(),
    });

    run.report.finish();
    let store = ReportStore::new(&config.report_dir);
    if let Err(save_err) = store.save(&run.report).await {
        warn!(catalog = %run.catalog, error = %save_err, "Failed to persist run report");
        if result.is_ok() {
            return Err(save_err.into());
        }
    }

    result.map(|()| run.report)
}

/// Mutable state of one catalog run.
struct CatalogRun {
    catalog: String,
    index: String,
    limit: usize,
    report: RunReport,
    client: DeliveryClient,
    failed_ops: Vec<ChangeOp>,
}

impl CatalogRun {
    async fn execute(
        &mut self,
        config: &Config,
        catalog_cfg: &CatalogConfig,
    ) -> Result<(), SyncError> {
        let current = NdjsonRecordStream::open(&catalog_cfg.source).await?;
        let snapshots = SnapshotStore::new(&config.snapshot_dir, &self.catalog);
        let previous = snapshots.reader().await?;
        let writer = snapshots.writer().await?;

        let mut merger = DiffMerger::new(current, previous, writer);
        let mut batcher = ChunkBatcher::new(&BatcherConfig {
            byte_quota: config.delivery.byte_quota,
            safety_margin_ratio: config.delivery.safety_margin_ratio,
            preferred_chunk_size: catalog_cfg.preferred_chunk_size,
        });

        // Diff and deliver in one streaming pass; the merger writes the
        // next snapshot as a side effect.
        if let Err(e) = self.drive(&mut merger, &mut batcher).await {
            self.report.processed_records = merger.records_processed();
            merger.abort().await;
            return Err(e);
        }
        self.report.processed_records = merger.records_processed();
        emit!(RecordsProcessed {
            count: self.report.processed_records as u64,
            catalog: self.catalog.clone(),
        });

        let writer = merger.finish().await?;

        // Final partial chunk.
        if let Some(chunk) = batcher.finish()
            && let Err(e) = self.deliver(chunk.ops).await
        {
            writer.discard().await;
            return Err(e);
        }

        // One bounded resend pass over everything that failed, in smaller
        // groups than the original chunk shapes.
        if !self.failed_ops.is_empty() {
            let groups = subdivide(std::mem::take(&mut self.failed_ops), self.limit);
            info!(
                catalog = %self.catalog,
                groups = groups.len(),
                "Resending failed operations in smaller groups"
            );
            for group in groups {
                if let Err(e) = self.deliver(group).await {
                    writer.discard().await;
                    return Err(e);
                }
            }
        }

        // The run survived; make the new snapshot the next baseline.
        let records = writer.record_count() as u64;
        writer.finalize().await?;
        emit!(SnapshotPromoted {
            records,
            catalog: self.catalog.clone(),
        });

        Ok(())
    }

    /// Pull operations from the merger and deliver chunks as they fill.
    async fn drive<C, P>(
        &mut self,
        merger: &mut DiffMerger<C, P>,
        batcher: &mut ChunkBatcher,
    ) -> Result<(), SyncError>
    where
        C: RecordStream,
        P: RecordStream,
    {
        while let Some(op) = merger.next_op().await? {
            self.report.records_to_send += 1;
            emit!(OperationEmitted {
                kind: op.kind(),
                catalog: self.catalog.clone(),
            });

            if let Some(chunk) = batcher.push(op)? {
                self.deliver(chunk.ops).await?;
            }
        }
        Ok(())
    }

    /// Deliver one group of operations and account for the outcome.
    ///
    /// A failed group is queued for the resend pass; the error return is
    /// reserved for unrecoverable conditions (payload serialization, or
    /// the failed-chunk budget being exhausted).
    async fn deliver(&mut self, ops: Vec<ChangeOp>) -> Result<(), SyncError> {
        let records = ops.len();
        let outcome = self.client.send_ops(&self.index, &ops).await?;

        if outcome.ok {
            self.report.chunk_sent(records);
            emit!(ChunkDelivered {
                records: records as u64,
                bytes: outcome.payload_bytes as u64,
                catalog: self.catalog.clone(),
            });
        } else {
            warn!(
                catalog = %self.catalog,
                records,
                attempts = outcome.attempts,
                status = ?outcome.status,
                message = ?outcome.message,
                "Chunk delivery failed"
            );
            self.report.chunk_failed(records);
            emit!(ChunkFailed {
                records: records as u64,
                catalog: self.catalog.clone(),
            });
            self.failed_ops.extend(ops);

            if self.report.chunks_failed > self.limit {
                return TooManyFailedChunksSnafu {
                    failed: self.report.chunks_failed,
                    limit: self.limit,
                }
                .fail();
            }
        }
        Ok(())
    }
}
