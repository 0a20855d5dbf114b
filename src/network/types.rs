use crate::chunk::ChunkDescriptor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Receives the cumulative number of body bytes handed to the connection.
pub type BytesSentFn = Arc<dyn Fn(u64) + Send + Sync>;

/// `POST /upload/init`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    pub purpose: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub filename: String,
    pub checksum: String,
    pub sparse_checksum: String,
}

/// `POST /upload/chunked/init`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitChunkedUploadRequest {
    pub purpose: String,
    pub content_type: String,
    pub total_size_bytes: u64,
    pub chunk_size_bytes: u64,
    pub total_chunks: u32,
    pub filename: String,
    pub checksum: String,
    pub sparse_checksum: String,
}

/// Answer to either init request. The fields present decide the strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

/// `GET /upload/{uploadId}/chunks?from=&to=`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkBatchResponse {
    pub chunks: Vec<ChunkDescriptor>,
}

/// `POST /upload/{uploadId}/chunks/{partNumber}/complete`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteChunkRequest {
    pub etag: String,
}

/// `POST /upload/{uploadId}/chunks/{partNumber}/retry`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReissueUrlResponse {
    pub upload_url: String,
}

/// `POST /upload/chunked/complete`. The server tracks parts itself, so
/// `parts` is sent empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompleteChunkedRequest {
    pub upload_id: String,
    pub parts: Vec<serde_json::Value>,
}

/// Final object metadata returned once an upload is finalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedObject {
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Raw outcome of one object-store PUT. Status interpretation is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    pub status: u16,
    pub etag: Option<String>,
}

impl PutResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
