use crate::chunk::error::{ChunkError, ChunkResult};
use crate::chunk::partition;
use crate::chunk::types::ChunkDescriptor;
use crate::network::ControlPlane;
use crate::plan::UploadPlan;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_URL_BATCH_SIZE: u32 = 10;

/// Inclusive part range requested in one signed-URL call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub from: u32,
    pub to: u32,
}

impl BatchRange {
    pub fn part_count(&self) -> u32 {
        self.to - self.from + 1
    }

    pub fn contains(&self, part: u32) -> bool {
        (self.from..=self.to).contains(&part)
    }
}

/// Fetches signed chunk URLs in bounded batches so that no URL is issued long
/// before it is used.
pub struct ChunkUrlBatcher {
    control: Arc<dyn ControlPlane>,
    batch_size: u32,
}

impl ChunkUrlBatcher {
    pub fn new(control: Arc<dyn ControlPlane>, batch_size: u32) -> Self {
        Self {
            control,
            batch_size: batch_size.max(1),
        }
    }

    /// Consecutive batches `[1..=b], [b+1..=2b], ...` covering `total_chunks`
    pub fn ranges(&self, total_chunks: u32) -> Vec<BatchRange> {
        let size = self.batch_size;
        (0..total_chunks.div_ceil(size))
            .map(|i| BatchRange {
                from: i * size + 1,
                to: ((i + 1) * size).min(total_chunks),
            })
            .collect()
    }

    /// Batches that still hold at least one of `pending`, in ascending order.
    pub fn ranges_for(&self, total_chunks: u32, pending: &[u32]) -> Vec<BatchRange> {
        self.ranges(total_chunks)
            .into_iter()
            .filter(|range| pending.iter().any(|p| range.contains(*p)))
            .collect()
    }

    /// Request and validate URLs for parts `from..=to` of a chunked plan.
    pub async fn next_batch(
        &self,
        plan: &UploadPlan,
        from: u32,
        to: u32,
    ) -> ChunkResult<Vec<ChunkDescriptor>> {
        let (total_chunks, chunk_size) = plan
            .chunk_layout()
            .ok_or_else(|| ChunkError::Protocol("plan has no chunk layout".into()))?;

        if from == 0 || from > to || to > total_chunks {
            return Err(ChunkError::Protocol(format!(
                "batch {from}-{to} outside 1-{total_chunks}"
            )));
        }

        let descriptors = self
            .control
            .chunk_urls(&plan.upload_id, from, to)
            .await
            .map_err(|source| ChunkError::UrlBatch { from, to, source })?;

        debug!(upload_id = %plan.upload_id, from, to, "chunk URLs issued");

        partition::validate_batch(descriptors, from, to, chunk_size, plan.total_size_bytes)
    }
}
