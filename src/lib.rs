//! Resumable, content-addressed chunked uploads.
//!
//! A local file is fingerprinted, an upload plan is negotiated with the control
//! plane, and the bytes are pushed to an object store through pre-signed URLs,
//! either as one direct PUT or as fixed-size chunks with bounded concurrency,
//! retries and signed-URL reissue.

pub mod cancel;
pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod fingerprint;
pub mod metrics;
pub mod network;
pub mod plan;
pub mod progress;
pub mod retry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancellationToken;
pub use config::UploaderConfig;
pub use coordinator::{UploadError, UploadOrchestrator, UploadReport, UploadRequest};
pub use fingerprint::{FileFingerprint, FingerprintEngine};
pub use plan::{UploadPlan, UploadStrategy};
pub use progress::{EventBus, UploadEvent};
pub use session::{SessionStatus, SessionStore, UploadSession};
