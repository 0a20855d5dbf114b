//! In-process doubles for the control plane and the object store.

use crate::chunk::{partition, ChunkDescriptor};
use crate::network::{
    BytesSentFn, CompletedObject, ControlPlane, InitChunkedUploadRequest, InitUploadRequest,
    InitUploadResponse, NetworkError, NetworkResult, ObjectStore, PutResponse,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Part number encoded in a mock URL's last segment (`part7`, `part7-reissued-1`)
pub fn part_of(url: &str) -> Option<u32> {
    let segment = url.rsplit('/').next()?;
    let digits: String = segment
        .strip_prefix("part")?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    total_size: u64,
    chunk_size: u64,
    object_key: &'static str,
}

/// Control plane that plans, signs and finalizes uploads in memory.
#[derive(Default)]
pub struct MockControlPlane {
    next_id: AtomicU32,
    layouts: Mutex<HashMap<String, Layout>>,
    single_inits: Mutex<Vec<InitUploadRequest>>,
    chunked_inits: Mutex<Vec<InitChunkedUploadRequest>>,
    url_batches: Mutex<Vec<(u32, u32)>>,
    notifies: Mutex<Vec<(u32, String)>>,
    reissues: AtomicUsize,
    completions: AtomicUsize,
    reject_init: Mutex<Option<(u16, String)>>,
    fail_url_batches: Mutex<Option<u16>>,
    fail_reissue: Mutex<Option<u16>>,
    fail_completions: AtomicU32,
    fail_notifies: Mutex<HashMap<u32, u32>>,
    shifted_ranges: Mutex<Option<u32>>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `chunk_urls` answer for an upload this mock never initialized
    pub fn register_upload(&self, upload_id: &str, total_size: u64, chunk_size: u64) {
        self.layouts.lock().insert(
            upload_id.to_string(),
            Layout {
                total_size,
                chunk_size,
                object_key: "objects/registered",
            },
        );
    }

    pub fn reject_init(&self, status: u16, message: &str) {
        *self.reject_init.lock() = Some((status, message.to_string()));
    }

    pub fn fail_url_batches(&self, status: u16) {
        *self.fail_url_batches.lock() = Some(status);
    }

    pub fn fail_reissue(&self, status: u16) {
        *self.fail_reissue.lock() = Some(status);
    }

    /// The next `times` notifies for `part` answer HTTP 503
    pub fn fail_notifies(&self, part: u32, times: u32) {
        self.fail_notifies.lock().insert(part, times);
    }

    /// Batches describe `part` one byte longer than the partition allows
    pub fn shift_range_of(&self, part: u32) {
        *self.shifted_ranges.lock() = Some(part);
    }

    /// The next `n` completion calls answer HTTP 500
    pub fn fail_completions(&self, n: u32) {
        self.fail_completions.store(n, Ordering::SeqCst);
    }

    pub fn single_inits(&self) -> usize {
        self.single_inits.lock().len()
    }

    pub fn chunked_inits(&self) -> Vec<InitChunkedUploadRequest> {
        self.chunked_inits.lock().clone()
    }

    pub fn url_batches(&self) -> Vec<(u32, u32)> {
        self.url_batches.lock().clone()
    }

    /// `(part, etag)` of every per-chunk completion notify, in arrival order
    pub fn notifies(&self) -> Vec<(u32, String)> {
        self.notifies.lock().clone()
    }

    pub fn reissues(&self) -> usize {
        self.reissues.load(Ordering::SeqCst)
    }

    /// Successful finalize calls
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    fn next_upload_id(&self) -> String {
        format!("u-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn rejection(&self) -> Option<NetworkError> {
        self.reject_init
            .lock()
            .clone()
            .map(|(status, message)| NetworkError::Status { status, message })
    }
}

fn status_error(status: u16, message: &str) -> NetworkError {
    NetworkError::Status {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn init_upload(&self, req: &InitUploadRequest) -> NetworkResult<InitUploadResponse> {
        self.single_inits.lock().push(req.clone());
        if let Some(err) = self.rejection() {
            return Err(err);
        }

        let upload_id = self.next_upload_id();
        Ok(InitUploadResponse {
            upload_url: Some(format!("mock://object/{upload_id}/direct")),
            object_key: Some(format!("objects/{}", req.filename)),
            bucket: Some("mock-bucket".into()),
            upload_id,
            ..Default::default()
        })
    }

    async fn init_chunked_upload(
        &self,
        req: &InitChunkedUploadRequest,
    ) -> NetworkResult<InitUploadResponse> {
        self.chunked_inits.lock().push(req.clone());
        if let Some(err) = self.rejection() {
            return Err(err);
        }

        let upload_id = self.next_upload_id();
        self.layouts.lock().insert(
            upload_id.clone(),
            Layout {
                total_size: req.total_size_bytes,
                chunk_size: req.chunk_size_bytes,
                object_key: "objects/chunked",
            },
        );

        Ok(InitUploadResponse {
            upload_id,
            total_chunks: Some(req.total_chunks),
            chunk_size_bytes: Some(req.chunk_size_bytes),
            object_key: Some(format!("objects/{}", req.filename)),
            bucket: Some("mock-bucket".into()),
            ..Default::default()
        })
    }

    async fn chunk_urls(
        &self,
        upload_id: &str,
        from: u32,
        to: u32,
    ) -> NetworkResult<Vec<ChunkDescriptor>> {
        self.url_batches.lock().push((from, to));
        if let Some(status) = *self.fail_url_batches.lock() {
            return Err(status_error(status, "signing service unavailable"));
        }

        let layout = self
            .layouts
            .lock()
            .get(upload_id)
            .copied()
            .ok_or_else(|| status_error(404, "unknown upload"))?;

        let shifted = *self.shifted_ranges.lock();
        Ok((from..=to)
            .filter_map(|part| {
                partition::expected_range(part, layout.chunk_size, layout.total_size).map(
                    |(start, end)| ChunkDescriptor {
                        part_number: part,
                        start_byte: start,
                        end_byte: if shifted == Some(part) { end + 1 } else { end },
                        upload_url: format!("mock://object/{upload_id}/part{part}"),
                    },
                )
            })
            .collect())
    }

    async fn complete_chunk(
        &self,
        _upload_id: &str,
        part_number: u32,
        etag: &str,
    ) -> NetworkResult<()> {
        if let Some(remaining) = self.fail_notifies.lock().get_mut(&part_number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(status_error(503, "notify backend unavailable"));
            }
        }
        self.notifies.lock().push((part_number, etag.to_string()));
        Ok(())
    }

    async fn reissue_chunk_url(&self, upload_id: &str, part_number: u32) -> NetworkResult<String> {
        if let Some(status) = *self.fail_reissue.lock() {
            return Err(status_error(status, "upload expired"));
        }
        let k = self.reissues.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "mock://object/{upload_id}/part{part_number}-reissued-{k}"
        ))
    }

    async fn complete_chunked_upload(&self, upload_id: &str) -> NetworkResult<CompletedObject> {
        let failing = self
            .fail_completions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(status_error(500, "multipart assembly failed"));
        }

        self.completions.fetch_add(1, Ordering::SeqCst);
        let layout = self.layouts.lock().get(upload_id).copied();
        Ok(CompletedObject {
            upload_id: Some(upload_id.to_string()),
            object_key: layout.map(|l| l.object_key.to_string()),
            bucket: Some("mock-bucket".into()),
            size_bytes: layout.map(|l| l.total_size),
            extra: Default::default(),
        })
    }
}

/// Scripted answer of the mock object store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutScript {
    Ok,
    Status(u16),
    /// 200 without an ETag header
    NoEtag,
    /// HTTP 500 for the first `n` PUTs, then success
    FailTimes(u32),
    /// Never answers
    Block,
}

/// Object store that accepts PUTs in memory and counts them.
#[derive(Default)]
pub struct MockObjectStore {
    by_url: Mutex<HashMap<String, PutScript>>,
    by_part: Mutex<HashMap<u32, PutScript>>,
    puts: Mutex<Vec<String>>,
    received_bytes: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Option<Duration>,
    part_latency: Mutex<HashMap<u32, Duration>>,
}

/// Keeps the in-flight gauge right when a PUT future is dropped mid-way
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every PUT open for `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Hold PUTs of `part` open for `latency`, overriding the store-wide one
    pub fn delay_part(&self, part: u32, latency: Duration) {
        self.part_latency.lock().insert(part, latency);
    }

    pub fn script(&self, url: &str, script: PutScript) {
        self.by_url.lock().insert(url.to_string(), script);
    }

    /// Script every URL of `part`, reissued ones included
    pub fn script_part(&self, part: u32, script: PutScript) {
        self.by_part.lock().insert(part, script);
    }

    pub fn puts_for(&self, url: &str) -> usize {
        self.puts.lock().iter().filter(|u| *u == url).count()
    }

    pub fn puts_for_part(&self, part: u32) -> usize {
        self.puts
            .lock()
            .iter()
            .filter(|u| part_of(u) == Some(part))
            .count()
    }

    pub fn total_puts(&self) -> usize {
        self.puts.lock().len()
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Script for `url` and how many earlier PUTs it already answered
    fn lookup(&self, url: &str) -> (PutScript, usize) {
        if let Some(script) = self.by_url.lock().get(url).copied() {
            return (script, self.puts_for(url));
        }
        if let Some(part) = part_of(url) {
            if let Some(script) = self.by_part.lock().get(&part).copied() {
                return (script, self.puts_for_part(part));
            }
        }
        (PutScript::Ok, 0)
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(
        &self,
        url: &str,
        body: Bytes,
        _content_type: &str,
        on_sent: BytesSentFn,
    ) -> NetworkResult<PutResponse> {
        let (script, earlier) = self.lookup(url);
        self.puts.lock().push(url.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if script == PutScript::Block {
            std::future::pending::<()>().await;
        }
        let latency = part_of(url)
            .and_then(|part| self.part_latency.lock().get(&part).copied())
            .or(self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let etag = url
            .rsplit('/')
            .next()
            .map(|segment| format!("\"etag-{segment}\""));

        let response = match script {
            PutScript::Status(status) => PutResponse { status, etag: None },
            PutScript::NoEtag => PutResponse {
                status: 200,
                etag: None,
            },
            PutScript::FailTimes(n) if earlier < n as usize => PutResponse {
                status: 500,
                etag: None,
            },
            _ => PutResponse { status: 200, etag },
        };

        if response.status == 200 {
            if !body.is_empty() {
                on_sent(body.len() as u64);
            }
            self.received_bytes
                .fetch_add(body.len() as u64, Ordering::SeqCst);
        }
        Ok(response)
    }
}
