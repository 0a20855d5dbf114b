use crate::cancel::Aborted;
use crate::chunk::ChunkError;
use crate::fingerprint::FingerprintError;
use crate::network::NetworkError;
use crate::plan::PlanError;
use crate::session::{FailurePhase, SessionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse class of a terminal failure, for deciding between "retry the
/// whole upload" and "retry completion only".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    PlanNegotiation,
    ChunkTransfer,
    MissingETag,
    UrlReissue,
    Completion,
    Aborted,
    Fingerprint,
    Protocol,
    Session,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PlanNegotiation => "PlanNegotiation",
            ErrorKind::ChunkTransfer => "ChunkTransfer",
            ErrorKind::MissingETag => "MissingETag",
            ErrorKind::UrlReissue => "UrlReissue",
            ErrorKind::Completion => "Completion",
            ErrorKind::Aborted => "Aborted",
            ErrorKind::Fingerprint => "Fingerprint",
            ErrorKind::Protocol => "Protocol",
            ErrorKind::Session => "Session",
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Fingerprint failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Negotiation failed: {0}")]
    Negotiation(#[from] PlanError),

    #[error("Chunk URLs {from}-{to} failed: {source}")]
    ChunkUrls {
        from: u32,
        to: u32,
        #[source]
        source: ChunkError,
    },

    #[error("Chunk {part} failed after {attempts} attempts: {source}")]
    Chunk {
        part: u32,
        attempts: u32,
        #[source]
        source: ChunkError,
    },

    #[error("Direct upload failed after {attempts} attempts: {source}")]
    Transfer {
        attempts: u32,
        #[source]
        source: ChunkError,
    },

    #[error("Completion refused locally, parts {missing:?} not uploaded")]
    Incomplete { missing: Vec<u32> },

    #[error("Completion failed: {0}")]
    Completion(#[source] NetworkError),

    #[error("Upload cancelled")]
    Aborted,

    #[error("Cannot resume: {0}")]
    CannotResume(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl From<Aborted> for UploadError {
    fn from(_: Aborted) -> Self {
        UploadError::Aborted
    }
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Fingerprint(_) => ErrorKind::Fingerprint,
            UploadError::Negotiation(_) => ErrorKind::PlanNegotiation,
            UploadError::ChunkUrls { source, .. }
            | UploadError::Chunk { source, .. }
            | UploadError::Transfer { source, .. } => chunk_error_kind(source),
            UploadError::Incomplete { .. } => ErrorKind::Protocol,
            UploadError::Completion(_) => ErrorKind::Completion,
            UploadError::Aborted => ErrorKind::Aborted,
            UploadError::CannotResume(_)
            | UploadError::InvalidTransition(_)
            | UploadError::Session(_) => ErrorKind::Session,
        }
    }

    /// Phase the session failed in. `None` for cancellation and for errors
    /// raised before the session state was touched.
    pub fn phase(&self) -> Option<FailurePhase> {
        match self {
            UploadError::Fingerprint(_) => Some(FailurePhase::Fingerprint),
            UploadError::Negotiation(_) => Some(FailurePhase::Negotiation),
            UploadError::ChunkUrls { from, to, .. } => Some(FailurePhase::ChunkUrls {
                from: *from,
                to: *to,
            }),
            UploadError::Chunk { part, .. } => Some(FailurePhase::Chunk { part: *part }),
            UploadError::Transfer { .. } => Some(FailurePhase::Transfer),
            // Missing parts are resumed, never finalized
            UploadError::Incomplete { missing } => Some(
                missing
                    .first()
                    .map_or(FailurePhase::Completion, |&part| FailurePhase::Chunk { part }),
            ),
            UploadError::Completion(_) => Some(FailurePhase::Completion),
            UploadError::Aborted
            | UploadError::CannotResume(_)
            | UploadError::InvalidTransition(_)
            | UploadError::Session(_) => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.kind() == ErrorKind::Aborted
    }
}

fn chunk_error_kind(err: &ChunkError) -> ErrorKind {
    match err {
        ChunkError::Transfer { .. } | ChunkError::UrlBatch { .. } => ErrorKind::ChunkTransfer,
        ChunkError::MissingETag { .. } => ErrorKind::MissingETag,
        ChunkError::UrlReissue { .. } => ErrorKind::UrlReissue,
        ChunkError::Protocol(_) => ErrorKind::Protocol,
        ChunkError::Io(_) => ErrorKind::Fingerprint,
        ChunkError::Aborted => ErrorKind::Aborted,
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
