use crate::network::NetworkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Upload rejected by control plane ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Control plane request failed: {0}")]
    Transport(#[source] NetworkError),

    #[error("Invalid upload plan: {0}")]
    InvalidPlan(String),

    #[error("{size_bytes} bytes in {chunk_size_bytes}-byte chunks exceeds the part number range")]
    TooManyChunks { size_bytes: u64, chunk_size_bytes: u64 },
}

impl From<NetworkError> for PlanError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Status { status, message } => PlanError::Rejected { status, message },
            other => PlanError::Transport(other),
        }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;
