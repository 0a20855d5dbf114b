use crate::chunk::partition;
use crate::network::InitUploadResponse;
use crate::plan::error::{PlanError, PlanResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStrategy {
    Single,
    Chunked,
}

/// The control plane's instructions for moving one file.
///
/// SINGLE plans carry `direct_url` and no chunk layout. CHUNKED plans carry
/// `total_chunks` and `chunk_size_bytes` and no direct URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPlan {
    pub upload_id: String,
    pub strategy: UploadStrategy,
    pub total_size_bytes: u64,
    pub total_chunks: Option<u32>,
    pub chunk_size_bytes: Option<u64>,
    pub direct_url: Option<String>,
    pub object_key: Option<String>,
    pub bucket: Option<String>,
}

impl UploadPlan {
    /// Build a plan from an init response. The strategy follows the fields
    /// the server returned, not the endpoint that was called.
    pub fn from_response(
        resp: InitUploadResponse,
        total_size_bytes: u64,
        requested_chunk_size: u64,
    ) -> PlanResult<Self> {
        if resp.upload_id.is_empty() {
            return Err(PlanError::InvalidPlan("missing uploadId".into()));
        }

        let plan = match (resp.total_chunks, resp.upload_url) {
            (Some(total_chunks), _) => UploadPlan {
                upload_id: resp.upload_id,
                strategy: UploadStrategy::Chunked,
                total_size_bytes,
                total_chunks: Some(total_chunks),
                chunk_size_bytes: Some(resp.chunk_size_bytes.unwrap_or(requested_chunk_size)),
                direct_url: None,
                object_key: resp.object_key,
                bucket: resp.bucket,
            },
            (None, Some(url)) => UploadPlan {
                upload_id: resp.upload_id,
                strategy: UploadStrategy::Single,
                total_size_bytes,
                total_chunks: None,
                chunk_size_bytes: None,
                direct_url: Some(url),
                object_key: resp.object_key,
                bucket: resp.bucket,
            },
            (None, None) => {
                return Err(PlanError::InvalidPlan(
                    "response has neither uploadUrl nor totalChunks".into(),
                ))
            }
        };

        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> PlanResult<()> {
        match self.strategy {
            UploadStrategy::Single => match &self.direct_url {
                Some(url) if !url.is_empty() => Ok(()),
                _ => Err(PlanError::InvalidPlan("single upload without a URL".into())),
            },
            UploadStrategy::Chunked => {
                let (total_chunks, chunk_size) = self
                    .chunk_layout()
                    .ok_or_else(|| PlanError::InvalidPlan("chunked upload without layout".into()))?;
                if !partition::layout_is_consistent(self.total_size_bytes, chunk_size, total_chunks)
                {
                    return Err(PlanError::InvalidPlan(format!(
                        "{total_chunks} chunks of {chunk_size} bytes do not cover {} bytes",
                        self.total_size_bytes
                    )));
                }
                Ok(())
            }
        }
    }

    /// `(total_chunks, chunk_size_bytes)` for chunked plans
    pub fn chunk_layout(&self) -> Option<(u32, u64)> {
        match (self.total_chunks, self.chunk_size_bytes) {
            (Some(n), Some(size)) if n > 0 && size > 0 => Some((n, size)),
            _ => None,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.strategy == UploadStrategy::Chunked
    }
}
