use crate::cancel::{run_cancellable, CancellationToken};
use crate::chunk::error::{ChunkError, ChunkResult};
use crate::chunk::types::{ChunkDescriptor, ChunkOutcome};
use crate::metrics::ChunkTimer;
use crate::network::{BytesSentFn, ObjectStore, TransferRateLimiter};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Performs one PUT attempt of one chunk. Retries live a level up.
#[derive(Clone)]
pub struct ChunkTransferWorker {
    store: Arc<dyn ObjectStore>,
    limiter: TransferRateLimiter,
}

impl ChunkTransferWorker {
    pub fn new(store: Arc<dyn ObjectStore>, limiter: TransferRateLimiter) -> Self {
        Self { store, limiter }
    }

    /// PUT `chunk_bytes` to `descriptor.upload_url` and return the part's ETag.
    ///
    /// Non-2xx answers and transport errors become [`ChunkError::Transfer`], a
    /// 2xx answer without an ETag becomes [`ChunkError::MissingETag`]. If
    /// `cancel` is already set no request is started.
    pub async fn transfer(
        &self,
        chunk_bytes: Bytes,
        descriptor: &ChunkDescriptor,
        content_type: &str,
        on_sent: BytesSentFn,
        cancel: &CancellationToken,
    ) -> ChunkResult<ChunkOutcome> {
        let part = descriptor.part_number;

        run_cancellable(cancel, self.limiter.wait_for_bytes(chunk_bytes.len()))
            .await
            .map_err(|_| ChunkError::Aborted)?;

        let timer = ChunkTimer::start();
        let response = run_cancellable(
            cancel,
            self.store
                .put(&descriptor.upload_url, chunk_bytes, content_type, on_sent),
        )
        .await
        .map_err(|_| ChunkError::Aborted)?
        .map_err(|e| ChunkError::Transfer {
            part,
            status: e.status(),
            message: e.to_string(),
        })?;

        if !response.is_success() {
            warn!(part, status = response.status, "chunk PUT rejected");
            return Err(ChunkError::Transfer {
                part,
                status: Some(response.status),
                message: format!("object store returned HTTP {}", response.status),
            });
        }

        let etag = response
            .etag
            .as_deref()
            .map(strip_etag_quotes)
            .filter(|etag| !etag.is_empty())
            .ok_or(ChunkError::MissingETag { part })?;

        timer.finish();
        debug!(part, %etag, "chunk stored");

        Ok(ChunkOutcome::succeeded(part, etag, 1))
    }
}

/// S3 returns ETags wrapped in double quotes
pub fn strip_etag_quotes(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}
