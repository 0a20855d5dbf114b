use crate::network::NetworkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunk {part} transfer failed: {message}")]
    Transfer {
        part: u32,
        status: Option<u16>,
        message: String,
    },

    #[error("Chunk {part} upload succeeded without an ETag")]
    MissingETag { part: u32 },

    #[error("Chunk {part} URL reissue failed: {message}")]
    UrlReissue { part: u32, message: String },

    #[error("Chunk URL request for parts {from}-{to} failed: {source}")]
    UrlBatch {
        from: u32,
        to: u32,
        #[source]
        source: NetworkError,
    },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Chunk transfer aborted")]
    Aborted,
}

impl ChunkError {
    /// Failures worth another attempt against the same part
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChunkError::Transfer { .. } | ChunkError::MissingETag { .. }
        )
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ChunkError::Aborted)
    }
}

pub type ChunkResult<T> = std::result::Result<T, ChunkError>;
