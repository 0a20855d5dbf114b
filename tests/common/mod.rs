//! Control plane and object store served by axum on an ephemeral port.

#![allow(dead_code)]

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use chunkstream_uploader::chunk::{partition, ChunkDescriptor};
use chunkstream_uploader::network::{
    ChunkBatchResponse, CompleteChunkRequest, CompleteChunkedRequest, CompletedObject,
    InitChunkedUploadRequest, InitUploadRequest, InitUploadResponse, ReissueUrlResponse,
};
use chunkstream_uploader::UploaderConfig;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

pub const TOKEN: &str = "test-token";
pub const KIB: u64 = 1024;

#[derive(Default)]
struct UploadRecord {
    total_size: u64,
    chunk_size: u64,
    parts: BTreeMap<u32, Vec<u8>>,
}

pub struct MockServer {
    pub base_url: String,
    next_id: AtomicU32,
    uploads: Mutex<HashMap<String, UploadRecord>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    /// Authorization header of every control-plane call
    pub control_auth: Mutex<Vec<Option<String>>>,
    /// Authorization header of every object-store PUT
    pub store_auth: Mutex<Vec<Option<String>>>,
    /// part -> remaining PUTs that answer 500
    fail_parts: Mutex<HashMap<u32, u32>>,
    reject_init: Mutex<Option<(u16, String)>>,
    pub puts: AtomicUsize,
    pub reissues: AtomicUsize,
    pub notified: Mutex<Vec<(u32, String)>>,
}

impl MockServer {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            next_id: AtomicU32::new(0),
            uploads: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            control_auth: Mutex::new(Vec::new()),
            store_auth: Mutex::new(Vec::new()),
            fail_parts: Mutex::new(HashMap::new()),
            reject_init: Mutex::new(None),
            puts: AtomicUsize::new(0),
            reissues: AtomicUsize::new(0),
            notified: Mutex::new(Vec::new()),
        }
    }

    /// The next `times` PUTs of `part` answer HTTP 500
    pub fn fail_part(&self, part: u32, times: u32) {
        self.fail_parts.lock().insert(part, times);
    }

    pub fn reject_init(&self, status: u16, message: &str) {
        *self.reject_init.lock() = Some((status, message.to_string()));
    }

    /// Bytes of a finalized object
    pub fn object(&self, upload_id: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(upload_id).cloned()
    }

    pub fn config(&self) -> UploaderConfig {
        UploaderConfig {
            base_url: self.base_url.clone(),
            bearer_token: Some(TOKEN.to_string()),
            single_upload_threshold: 8 * KIB,
            chunk_size_bytes: 4 * KIB,
            url_batch_size: 3,
            concurrency: 2,
            max_attempts: 3,
            base_delay_ms: 5,
            fingerprint_sample_bytes: KIB,
            ..Default::default()
        }
    }

    fn record_auth(&self, headers: &HeaderMap) {
        self.control_auth.lock().push(auth_of(headers));
    }

    fn next_upload_id(&self) -> String {
        format!("up-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn object_url(&self, upload_id: &str, key: &str) -> String {
        format!("{}/s3/{upload_id}/{key}", self.base_url)
    }

    fn rejection(&self) -> Option<Response> {
        self.reject_init.lock().clone().map(|(status, message)| {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FORBIDDEN);
            (status, Json(json!({ "message": message }))).into_response()
        })
    }
}

fn auth_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Start the server and return its shared state
pub async fn spawn() -> Arc<MockServer> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(MockServer::new(format!("http://{addr}")));

    let app = Router::new()
        .route("/upload/init", post(init_upload))
        .route("/upload/chunked/init", post(init_chunked))
        .route("/upload/chunked/complete", post(complete_upload))
        .route("/upload/:id/chunks", get(chunk_urls))
        .route("/upload/:id/chunks/:part/complete", post(complete_chunk))
        .route("/upload/:id/chunks/:part/retry", post(reissue_url))
        .route("/s3/:id/:key", put(put_object))
        .layer(DefaultBodyLimit::disable())
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    state
}

async fn init_upload(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
    Json(req): Json<InitUploadRequest>,
) -> Response {
    server.record_auth(&headers);
    if let Some(rejection) = server.rejection() {
        return rejection;
    }

    let upload_id = server.next_upload_id();
    server.uploads.lock().insert(
        upload_id.clone(),
        UploadRecord {
            total_size: req.size_bytes,
            ..Default::default()
        },
    );

    Json(InitUploadResponse {
        upload_url: Some(server.object_url(&upload_id, "direct")),
        object_key: Some(format!("media/{}", req.filename)),
        bucket: Some("test-bucket".into()),
        upload_id,
        ..Default::default()
    })
    .into_response()
}

async fn init_chunked(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
    Json(req): Json<InitChunkedUploadRequest>,
) -> Response {
    server.record_auth(&headers);
    if let Some(rejection) = server.rejection() {
        return rejection;
    }

    let upload_id = server.next_upload_id();
    server.uploads.lock().insert(
        upload_id.clone(),
        UploadRecord {
            total_size: req.total_size_bytes,
            chunk_size: req.chunk_size_bytes,
            parts: BTreeMap::new(),
        },
    );

    Json(InitUploadResponse {
        upload_id,
        total_chunks: Some(req.total_chunks),
        chunk_size_bytes: Some(req.chunk_size_bytes),
        object_key: Some(format!("media/{}", req.filename)),
        bucket: Some("test-bucket".into()),
        ..Default::default()
    })
    .into_response()
}

#[derive(Deserialize)]
struct Range {
    from: u32,
    to: u32,
}

async fn chunk_urls(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
    Path(upload_id): Path<String>,
    Query(range): Query<Range>,
) -> Response {
    server.record_auth(&headers);
    let Some((total_size, chunk_size)) = server
        .uploads
        .lock()
        .get(&upload_id)
        .map(|u| (u.total_size, u.chunk_size))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let chunks = (range.from..=range.to)
        .filter_map(|part| {
            partition::expected_range(part, chunk_size, total_size).map(|(start, end)| {
                ChunkDescriptor {
                    part_number: part,
                    start_byte: start,
                    end_byte: end,
                    upload_url: server.object_url(&upload_id, &format!("part{part}")),
                }
            })
        })
        .collect();

    Json(ChunkBatchResponse { chunks }).into_response()
}

async fn complete_chunk(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
    Path((_upload_id, part)): Path<(String, u32)>,
    Json(req): Json<CompleteChunkRequest>,
) -> StatusCode {
    server.record_auth(&headers);
    server.notified.lock().push((part, req.etag));
    StatusCode::OK
}

async fn reissue_url(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
    Path((upload_id, part)): Path<(String, u32)>,
) -> Json<ReissueUrlResponse> {
    server.record_auth(&headers);
    let k = server.reissues.fetch_add(1, Ordering::SeqCst) + 1;
    Json(ReissueUrlResponse {
        upload_url: server.object_url(&upload_id, &format!("part{part}-r{k}")),
    })
}

async fn complete_upload(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
    Json(req): Json<CompleteChunkedRequest>,
) -> Response {
    server.record_auth(&headers);
    let Some(record) = server.uploads.lock().remove(&req.upload_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let assembled: Vec<u8> = record.parts.into_values().flatten().collect();
    if assembled.len() as u64 != record.total_size {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "parts missing" })),
        )
            .into_response();
    }
    server.objects.lock().insert(req.upload_id.clone(), assembled);

    Json(CompletedObject {
        upload_id: Some(req.upload_id),
        object_key: Some("media/assembled".into()),
        bucket: Some("test-bucket".into()),
        size_bytes: Some(record.total_size),
        extra: Default::default(),
    })
    .into_response()
}

async fn put_object(
    State(server): State<Arc<MockServer>>,
    headers: HeaderMap,
    Path((upload_id, key)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    server.store_auth.lock().push(auth_of(&headers));
    server.puts.fetch_add(1, Ordering::SeqCst);

    if key == "direct" {
        server.objects.lock().insert(upload_id.clone(), body.to_vec());
        return (StatusCode::OK, [(header::ETAG, format!("\"{upload_id}-direct\""))])
            .into_response();
    }

    let Some(part) = key
        .strip_prefix("part")
        .and_then(|rest| rest.split('-').next())
        .and_then(|digits| digits.parse::<u32>().ok())
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    {
        let mut failing = server.fail_parts.lock();
        if let Some(remaining) = failing.get_mut(&part) {
            if *remaining > 0 {
                *remaining -= 1;
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    match server.uploads.lock().get_mut(&upload_id) {
        Some(record) => {
            record.parts.insert(part, body.to_vec());
        }
        None => return StatusCode::NOT_FOUND.into_response(),
    }

    (StatusCode::OK, [(header::ETAG, format!("\"{upload_id}-{part}\""))]).into_response()
}
