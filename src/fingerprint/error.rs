use thiserror::Error;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("File changed while hashing: expected {expected} bytes, read {actual}")]
    SizeChanged { expected: u64, actual: u64 },
}

pub type FingerprintResult<T> = Result<T, FingerprintError>;
