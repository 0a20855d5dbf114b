use crate::network::error::NetworkResult;
use crate::network::types::{BytesSentFn, PutResponse};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};

/// Granularity of upload-progress callbacks.
const PROGRESS_SLICE: usize = 64 * 1024;

/// Boundary to the S3-compatible store behind pre-signed URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// PUT `body` to `url`. Any HTTP answer is returned as a [`PutResponse`];
    /// only transport failures are errors.
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        content_type: &str,
        on_sent: BytesSentFn,
    ) -> NetworkResult<PutResponse>;
}

/// Pre-signed URLs carry their own authorization, so this client sends no
/// bearer header.
#[derive(Clone, Default)]
pub struct HttpObjectStore {
    http: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new() -> NetworkResult<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        content_type: &str,
        on_sent: BytesSentFn,
    ) -> NetworkResult<PutResponse> {
        let len = body.len();
        let resp = self
            .http
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(progress_stream(body, on_sent)))
            .send()
            .await?;

        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(PutResponse {
            status: resp.status().as_u16(),
            etag,
        })
    }
}

/// Split `body` into slices, reporting the running total as each is handed off.
fn progress_stream(
    body: Bytes,
    on_sent: BytesSentFn,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let slices: Vec<Bytes> = (0..body.len())
        .step_by(PROGRESS_SLICE)
        .map(|start| body.slice(start..(start + PROGRESS_SLICE).min(body.len())))
        .collect();

    let mut sent = 0u64;
    futures::stream::iter(slices.into_iter().map(move |slice| {
        sent += slice.len() as u64;
        on_sent(sent);
        Ok(slice)
    }))
}
