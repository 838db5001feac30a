//! Byte-budget-aware chunking of change operations.
//!
//! The remote service enforces a hard payload-size quota per request.
//! Operations are grouped into chunks whose serialized size stays within
//! `byte_quota × (1 − safety_margin_ratio)`; the margin absorbs envelope
//! overhead and record-size variance around the sampled estimate.

use snafu::ResultExt;
use tracing::{debug, warn};

use crate::diff::ChangeOp;
use crate::error::{DeliveryError, SerializePayloadSnafu};

/// Sizing policy for the batcher.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Maximum serialized payload size accepted by the remote endpoint.
    pub byte_quota: usize,
    /// Fraction of the quota reserved as margin.
    pub safety_margin_ratio: f64,
    /// Caller-supplied upper bound on operations per chunk, applied in
    /// addition to the quota-derived bound.
    pub preferred_chunk_size: Option<usize>,
}

/// An ordered group of change operations sized for one delivery request.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Operations in ascending key order.
    pub ops: Vec<ChangeOp>,
    /// Total serialized size of the operations.
    pub bytes: usize,
}

impl Chunk {
    /// Number of operations in this chunk.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when the chunk holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Groups the operation stream into size-bounded chunks.
///
/// The quota-derived operation cap is estimated once per run from the first
/// operation seen (`floor(byte_quota / representative_size)`); the byte
/// budget is then enforced against actual serialized sizes, which is why
/// the safety margin exists.
pub struct ChunkBatcher {
    budget: usize,
    byte_quota: usize,
    preferred: Option<usize>,
    max_ops: Option<usize>,
    ops: Vec<ChangeOp>,
    bytes: usize,
}

impl ChunkBatcher {
    /// Create a batcher from the sizing policy.
    pub fn new(config: &BatcherConfig) -> Self {
        let budget =
            (config.byte_quota as f64 * (1.0 - config.safety_margin_ratio)).floor() as usize;
        Self {
            budget,
            byte_quota: config.byte_quota,
            preferred: config.preferred_chunk_size,
            max_ops: None,
            ops: Vec::new(),
            bytes: 0,
        }
    }

    /// Effective per-chunk operation cap, once the representative size is
    /// known: `min(preferred_chunk_size, floor(byte_quota / representative))`.
    fn effective_max_ops(&self) -> usize {
        let quota_derived = self.max_ops.unwrap_or(usize::MAX);
        self.preferred.unwrap_or(usize::MAX).min(quota_derived)
    }

    /// Add one operation; returns a completed chunk when one was cut.
    pub fn push(&mut self, op: ChangeOp) -> Result<Option<Chunk>, DeliveryError> {
        let size = serde_json::to_vec(&op)
            .context(SerializePayloadSnafu)?
            .len();

        if self.max_ops.is_none() {
            // Representative record size, measured from the first operation.
            let derived = (self.byte_quota / size.max(1)).max(1);
            debug!(
                representative_bytes = size,
                max_ops = derived,
                "Derived chunk operation cap from sample record"
            );
            self.max_ops = Some(derived);
        }

        if size > self.budget {
            // Documented edge case: a single record larger than the whole
            // budget still ships, alone, and may exceed the quota.
            warn!(
                key = op.key(),
                bytes = size,
                budget = self.budget,
                "Operation exceeds chunk byte budget, sending as oversized chunk"
            );
        }

        let mut cut = None;
        if !self.ops.is_empty() && self.bytes + size > self.budget {
            cut = self.take_chunk();
        }

        self.ops.push(op);
        self.bytes += size;

        if cut.is_none() && self.ops.len() >= self.effective_max_ops() {
            cut = self.take_chunk();
        }

        Ok(cut)
    }

    /// Return the final partial chunk, if any operations remain buffered.
    pub fn finish(mut self) -> Option<Chunk> {
        self.take_chunk()
    }

    fn take_chunk(&mut self) -> Option<Chunk> {
        if self.ops.is_empty() {
            return None;
        }
        let chunk = Chunk {
            ops: std::mem::take(&mut self.ops),
            bytes: std::mem::take(&mut self.bytes),
        };
        Some(chunk)
    }
}
