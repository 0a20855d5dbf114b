use crate::coordinator::error::UploadError;
use crate::session::{FailurePhase, SessionStatus, UploadSession};
use std::path::PathBuf;

/// Inputs of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTransition {
    /// Plan negotiated, bytes about to move
    Start,
    Fail { phase: FailurePhase },
    Complete,
    Cancel,
    /// Continue an interrupted chunked session
    Resume,
    /// Re-issue only the final completion call
    RetryCompletion,
}

/// What to upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub content_type: String,
    /// Defaults to the file name of `path`
    pub filename: Option<String>,
    /// Defaults to the orchestrator's configured purpose
    pub purpose: Option<String>,
}

impl UploadRequest {
    pub fn new(path: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.into(),
            filename: None,
            purpose: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn resolved_filename(&self) -> String {
        self.filename.clone().unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.bin".to_string())
        })
    }
}

/// Final state of one orchestrator call.
///
/// The session is returned on every path so callers can resume it or retry
/// its completion.
#[derive(Debug)]
pub struct UploadReport {
    pub session: UploadSession,
    pub error: Option<UploadError>,
}

impl UploadReport {
    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn is_completed(&self) -> bool {
        self.session.status.is_completed() && self.error.is_none()
    }

    pub fn into_result(self) -> Result<UploadSession, UploadError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.session),
        }
    }
}
