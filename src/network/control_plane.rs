//! Control-plane client.
//!
//! Every call carries the caller-supplied bearer credential. Non-2xx answers
//! surface as [`NetworkError::Status`] with the server's message.

use crate::chunk::ChunkDescriptor;
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::types::{
    ChunkBatchResponse, CompleteChunkRequest, CompleteChunkedRequest, CompletedObject,
    InitChunkedUploadRequest, InitUploadRequest, InitUploadResponse, ReissueUrlResponse,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;

/// Longest server body quoted back in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Boundary to the service that plans uploads and hands out signed URLs.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn init_upload(&self, req: &InitUploadRequest) -> NetworkResult<InitUploadResponse>;

    async fn init_chunked_upload(
        &self,
        req: &InitChunkedUploadRequest,
    ) -> NetworkResult<InitUploadResponse>;

    /// Signed URLs for parts `from..=to`.
    async fn chunk_urls(
        &self,
        upload_id: &str,
        from: u32,
        to: u32,
    ) -> NetworkResult<Vec<ChunkDescriptor>>;

    async fn complete_chunk(&self, upload_id: &str, part_number: u32, etag: &str)
        -> NetworkResult<()>;

    /// Fresh signed URL for one part whose previous URL stopped working.
    async fn reissue_chunk_url(&self, upload_id: &str, part_number: u32) -> NetworkResult<String>;

    async fn complete_chunked_upload(&self, upload_id: &str) -> NetworkResult<CompletedObject>;
}

pub struct HttpControlPlane {
    http: reqwest::Client,
    base_url: String,
}

impl HttpControlPlane {
    pub fn new(base_url: &str, bearer_token: Option<&str>) -> NetworkResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = bearer_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| NetworkError::InvalidToken)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> NetworkResult<T> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                message: server_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> NetworkResult<()> {
        let resp = req.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NetworkError::Status {
                status: status.as_u16(),
                message: server_message(&body),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn init_upload(&self, req: &InitUploadRequest) -> NetworkResult<InitUploadResponse> {
        self.send_json(self.http.post(self.url("/upload/init")).json(req))
            .await
    }

    async fn init_chunked_upload(
        &self,
        req: &InitChunkedUploadRequest,
    ) -> NetworkResult<InitUploadResponse> {
        self.send_json(self.http.post(self.url("/upload/chunked/init")).json(req))
            .await
    }

    async fn chunk_urls(
        &self,
        upload_id: &str,
        from: u32,
        to: u32,
    ) -> NetworkResult<Vec<ChunkDescriptor>> {
        let url = self.url(&format!("/upload/{upload_id}/chunks"));
        let resp: ChunkBatchResponse = self
            .send_json(self.http.get(url).query(&[("from", from), ("to", to)]))
            .await?;
        Ok(resp.chunks)
    }

    async fn complete_chunk(
        &self,
        upload_id: &str,
        part_number: u32,
        etag: &str,
    ) -> NetworkResult<()> {
        let url = self.url(&format!("/upload/{upload_id}/chunks/{part_number}/complete"));
        let body = CompleteChunkRequest {
            etag: etag.to_string(),
        };
        self.send_empty(self.http.post(url).json(&body)).await
    }

    async fn reissue_chunk_url(&self, upload_id: &str, part_number: u32) -> NetworkResult<String> {
        let url = self.url(&format!("/upload/{upload_id}/chunks/{part_number}/retry"));
        let resp: ReissueUrlResponse = self.send_json(self.http.post(url)).await?;
        Ok(resp.upload_url)
    }

    async fn complete_chunked_upload(&self, upload_id: &str) -> NetworkResult<CompletedObject> {
        let body = CompleteChunkedRequest {
            upload_id: upload_id.to_string(),
            parts: Vec::new(),
        };
        self.send_json(self.http.post(self.url("/upload/chunked/complete")).json(&body))
            .await
    }
}

/// Pull `message`/`error` out of a JSON error body, falling back to the raw text.
fn server_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
