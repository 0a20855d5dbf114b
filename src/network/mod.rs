pub mod control_plane;
pub mod error;
pub mod object_store;
pub mod rate_limiter;
pub mod types;

pub use control_plane::{ControlPlane, HttpControlPlane};
pub use error::{NetworkError, NetworkResult};
pub use object_store::{HttpObjectStore, ObjectStore};
pub use rate_limiter::TransferRateLimiter;
pub use types::{
    BytesSentFn, ChunkBatchResponse, CompleteChunkRequest, CompleteChunkedRequest,
    CompletedObject, InitChunkedUploadRequest, InitUploadRequest, InitUploadResponse, PutResponse,
    ReissueUrlResponse,
};
