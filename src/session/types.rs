use crate::chunk::ChunkOutcome;
use crate::fingerprint::FileFingerprint;
use crate::network::CompletedObject;
use crate::plan::UploadPlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Where a FAILED session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FailurePhase {
    Fingerprint,
    Negotiation,
    ChunkUrls { from: u32, to: u32 },
    Chunk { part: u32 },
    /// The single direct PUT
    Transfer,
    Completion,
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePhase::Fingerprint => write!(f, "fingerprint"),
            FailurePhase::Negotiation => write!(f, "negotiation"),
            FailurePhase::ChunkUrls { from, to } => write!(f, "chunk URLs {from}-{to}"),
            FailurePhase::Chunk { part } => write!(f, "chunk {part}"),
            FailurePhase::Transfer => write!(f, "transfer"),
            FailurePhase::Completion => write!(f, "completion"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Uploading,
    Completed,
    Failed { phase: FailurePhase },
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed { .. } | SessionStatus::Cancelled
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }

    /// Bytes are all on the object store, only the finalize call failed
    pub fn is_completion_failed(&self) -> bool {
        matches!(
            self,
            SessionStatus::Failed {
                phase: FailurePhase::Completion
            }
        )
    }

    /// Stable label used for the store's status column
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Uploading => "UPLOADING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed { .. } => "FAILED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Failed { phase } => write!(f, "FAILED ({phase})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Everything known about one upload of one file.
///
/// Owned by the orchestrator while a call runs; persisted as a snapshot by
/// the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub session_id: String,
    pub file_path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub purpose: String,
    pub fingerprint: Option<FileFingerprint>,
    pub plan: Option<UploadPlan>,
    pub chunk_outcomes: BTreeMap<u32, ChunkOutcome>,
    pub uploaded_bytes: u64,
    pub status: SessionStatus,
    pub object: Option<CompletedObject>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UploadSession {
    pub fn new(
        file_path: PathBuf,
        filename: String,
        content_type: String,
        purpose: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            file_path,
            filename,
            content_type,
            purpose,
            fingerprint: None,
            plan: None,
            chunk_outcomes: BTreeMap::new(),
            uploaded_bytes: 0,
            status: SessionStatus::Pending,
            object: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.plan.as_ref().map(|p| p.upload_id.as_str())
    }

    pub fn total_bytes(&self) -> u64 {
        self.fingerprint.as_ref().map(|f| f.size_bytes).unwrap_or(0)
    }

    /// Record the final outcome of a part. `bytes` counts toward
    /// `uploaded_bytes` only for a first success, so a part is never counted
    /// twice. Returns whether the byte count changed.
    pub fn record_outcome(&mut self, outcome: ChunkOutcome, bytes: u64) -> bool {
        let part = outcome.part_number;
        if self
            .chunk_outcomes
            .get(&part)
            .is_some_and(|existing| existing.is_succeeded())
        {
            return false;
        }

        let counted = outcome.is_succeeded();
        self.chunk_outcomes.insert(part, outcome);
        if counted {
            self.uploaded_bytes += bytes;
        }
        self.touch();
        counted
    }

    /// Parts of a chunked plan without a SUCCEEDED outcome, ascending
    pub fn missing_parts(&self) -> Vec<u32> {
        let Some((total, _)) = self.plan.as_ref().and_then(|p| p.chunk_layout()) else {
            return Vec::new();
        };
        (1..=total)
            .filter(|part| {
                !self
                    .chunk_outcomes
                    .get(part)
                    .is_some_and(|o| o.is_succeeded())
            })
            .collect()
    }

    pub fn all_parts_succeeded(&self) -> bool {
        self.plan.as_ref().is_some_and(|p| p.chunk_layout().is_some())
            && self.missing_parts().is_empty()
    }

    pub fn succeeded_parts(&self) -> usize {
        self.chunk_outcomes
            .values()
            .filter(|o| o.is_succeeded())
            .count()
    }

    /// A chunked session interrupted before its bytes were all confirmed
    pub fn can_resume(&self) -> bool {
        let chunked = self.plan.as_ref().is_some_and(|p| p.is_chunked());
        let interrupted = match self.status {
            SessionStatus::Uploading | SessionStatus::Cancelled => true,
            SessionStatus::Failed { phase } => matches!(
                phase,
                FailurePhase::Chunk { .. } | FailurePhase::ChunkUrls { .. }
            ),
            _ => false,
        };
        chunked && interrupted && self.fingerprint.is_some()
    }

    pub fn progress_percent(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return if self.status.is_completed() { 100.0 } else { 0.0 };
        }
        self.uploaded_bytes as f64 / total as f64 * 100.0
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::UploadStrategy;

    fn chunked_session(total_chunks: u32) -> UploadSession {
        let mut session = UploadSession::new(
            PathBuf::from("/tmp/clip.mp4"),
            "clip.mp4".into(),
            "video/mp4".into(),
            "video".into(),
        );
        session.fingerprint = Some(FileFingerprint {
            sparse_hash: "s".into(),
            full_hash: "f".into(),
            size_bytes: total_chunks as u64 * 10,
        });
        session.plan = Some(UploadPlan {
            upload_id: "u-1".into(),
            strategy: UploadStrategy::Chunked,
            total_size_bytes: total_chunks as u64 * 10,
            total_chunks: Some(total_chunks),
            chunk_size_bytes: Some(10),
            direct_url: None,
            object_key: None,
            bucket: None,
        });
        session
    }

    #[test]
    fn test_success_is_counted_once() {
        let mut session = chunked_session(3);
        assert!(session.record_outcome(ChunkOutcome::succeeded(2, "e2".into(), 1), 10));
        assert!(!session.record_outcome(ChunkOutcome::succeeded(2, "e2b".into(), 1), 10));
        assert_eq!(session.uploaded_bytes, 10);
        assert_eq!(session.chunk_outcomes[&2].etag, "e2");
    }

    #[test]
    fn test_failure_does_not_overwrite_success() {
        let mut session = chunked_session(3);
        session.record_outcome(ChunkOutcome::succeeded(1, "e1".into(), 1), 10);
        session.record_outcome(ChunkOutcome::failed(1, 4), 10);
        assert!(session.chunk_outcomes[&1].is_succeeded());
    }

    #[test]
    fn test_missing_parts() {
        let mut session = chunked_session(4);
        session.record_outcome(ChunkOutcome::succeeded(1, "e1".into(), 1), 10);
        session.record_outcome(ChunkOutcome::failed(2, 4), 10);
        session.record_outcome(ChunkOutcome::succeeded(4, "e4".into(), 2), 10);

        assert_eq!(session.missing_parts(), vec![2, 3]);
        assert!(!session.all_parts_succeeded());
        assert_eq!(session.succeeded_parts(), 2);
        assert_eq!(session.progress_percent(), 50.0);
    }

    #[test]
    fn test_resumable_states() {
        let mut session = chunked_session(2);
        session.status = SessionStatus::Failed {
            phase: FailurePhase::Chunk { part: 2 },
        };
        assert!(session.can_resume());

        session.status = SessionStatus::Failed {
            phase: FailurePhase::Completion,
        };
        assert!(!session.can_resume());
        assert!(session.status.is_completion_failed());

        session.status = SessionStatus::Cancelled;
        assert!(session.can_resume());

        session.status = SessionStatus::Completed;
        assert!(!session.can_resume());
    }

    #[test]
    fn test_failure_phase_names_the_phase() {
        assert_eq!(FailurePhase::Negotiation.to_string(), "negotiation");
        assert_eq!(FailurePhase::Chunk { part: 3 }.to_string(), "chunk 3");
        assert_eq!(FailurePhase::Completion.to_string(), "completion");
        assert_eq!(
            SessionStatus::Failed {
                phase: FailurePhase::Chunk { part: 3 }
            }
            .to_string(),
            "FAILED (chunk 3)"
        );
    }

    #[test]
    fn test_status_serializes_with_phase() {
        let status = SessionStatus::Failed {
            phase: FailurePhase::Chunk { part: 3 },
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["state"], "FAILED");
        assert_eq!(json["phase"]["kind"], "chunk");
        assert_eq!(json["phase"]["part"], 3);

        let back: SessionStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }
}
