use crate::coordinator::error::{UploadError, UploadResult};
use crate::coordinator::types::UploadTransition;
use crate::session::{FailurePhase, SessionStatus};
use parking_lot::RwLock;
use std::sync::Arc;

/// `PENDING -> UPLOADING -> {COMPLETED | FAILED | CANCELLED}`, plus the two
/// ways back into UPLOADING: resuming an interrupted chunked session and
/// retrying a failed completion.
#[derive(Clone)]
pub struct UploadStateMachine {
    state: Arc<RwLock<SessionStatus>>,
}

impl Default for UploadStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadStateMachine {
    pub fn new() -> Self {
        Self::from_status(SessionStatus::Pending)
    }

    /// Pick up a persisted session where it stopped
    pub fn from_status(status: SessionStatus) -> Self {
        Self {
            state: Arc::new(RwLock::new(status)),
        }
    }

    pub fn current_state(&self) -> SessionStatus {
        *self.state.read()
    }

    pub fn transition(&self, event: UploadTransition) -> UploadResult<SessionStatus> {
        use SessionStatus::*;
        use UploadTransition as T;

        let mut state = self.state.write();

        let new_state = match (*state, event) {
            (Pending, T::Start) => Uploading,

            // Fingerprint and negotiation fail before anything is uploaded
            (Pending | Uploading, T::Fail { phase }) => Failed { phase },

            (Uploading, T::Complete) => Completed,

            (Pending | Uploading, T::Cancel) => Cancelled,
            // Cancelling twice, or after the end, changes nothing
            (current, T::Cancel) => current,

            (Uploading | Cancelled, T::Resume) => Uploading,
            (
                Failed {
                    phase: FailurePhase::Chunk { .. } | FailurePhase::ChunkUrls { .. },
                },
                T::Resume,
            ) => Uploading,

            (
                Failed {
                    phase: FailurePhase::Completion,
                },
                T::RetryCompletion,
            ) => Uploading,

            (current, event) => {
                return Err(UploadError::InvalidTransition(format!(
                    "Cannot handle {event:?} in state {current}"
                )));
            }
        };

        *state = new_state;
        Ok(new_state)
    }
}
