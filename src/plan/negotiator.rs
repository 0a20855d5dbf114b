use crate::chunk::partition;
use crate::fingerprint::FileFingerprint;
use crate::network::{ControlPlane, InitChunkedUploadRequest, InitUploadRequest};
use crate::plan::error::{PlanError, PlanResult};
use crate::plan::types::UploadPlan;
use std::sync::Arc;
use tracing::{debug, info};

/// Asks the control plane how a file should be uploaded.
///
/// Negotiation is a single request. Failures are never retried here.
pub struct UploadPlanNegotiator {
    control: Arc<dyn ControlPlane>,
    purpose: String,
    single_upload_threshold: u64,
    chunk_size_bytes: u64,
}

impl UploadPlanNegotiator {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        purpose: impl Into<String>,
        single_upload_threshold: u64,
        chunk_size_bytes: u64,
    ) -> Self {
        Self {
            control,
            purpose: purpose.into(),
            single_upload_threshold,
            chunk_size_bytes,
        }
    }

    /// Files strictly below the threshold go through the single-upload init
    pub fn wants_single(&self, size_bytes: u64) -> bool {
        size_bytes < self.single_upload_threshold
    }

    pub async fn negotiate(
        &self,
        filename: &str,
        size_bytes: u64,
        content_type: &str,
        fingerprint: &FileFingerprint,
    ) -> PlanResult<UploadPlan> {
        self.negotiate_with_purpose(&self.purpose, filename, size_bytes, content_type, fingerprint)
            .await
    }

    /// Same as [`negotiate`](Self::negotiate) with a per-upload purpose
    pub async fn negotiate_with_purpose(
        &self,
        purpose: &str,
        filename: &str,
        size_bytes: u64,
        content_type: &str,
        fingerprint: &FileFingerprint,
    ) -> PlanResult<UploadPlan> {
        let response = if self.wants_single(size_bytes) {
            debug!(filename, size_bytes, "requesting single upload");
            let req = InitUploadRequest {
                purpose: purpose.to_string(),
                content_type: content_type.to_string(),
                size_bytes,
                filename: filename.to_string(),
                checksum: fingerprint.full_hash.clone(),
                sparse_checksum: fingerprint.sparse_hash.clone(),
            };
            self.control.init_upload(&req).await?
        } else {
            let total_chunks = partition::total_chunks(size_bytes, self.chunk_size_bytes)
                .ok_or(PlanError::TooManyChunks {
                    size_bytes,
                    chunk_size_bytes: self.chunk_size_bytes,
                })?;
            debug!(filename, size_bytes, total_chunks, "requesting chunked upload");
            let req = InitChunkedUploadRequest {
                purpose: purpose.to_string(),
                content_type: content_type.to_string(),
                total_size_bytes: size_bytes,
                chunk_size_bytes: self.chunk_size_bytes,
                total_chunks,
                filename: filename.to_string(),
                checksum: fingerprint.full_hash.clone(),
                sparse_checksum: fingerprint.sparse_hash.clone(),
            };
            self.control.init_chunked_upload(&req).await?
        };

        let plan = UploadPlan::from_response(response, size_bytes, self.chunk_size_bytes)?;
        info!(
            upload_id = %plan.upload_id,
            strategy = ?plan.strategy,
            total_chunks = ?plan.total_chunks,
            "upload plan negotiated"
        );
        Ok(plan)
    }
}
