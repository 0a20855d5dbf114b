use thiserror::Error;

/// Failures of the session checkpoint store
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session store query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored session snapshot is unreadable: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
