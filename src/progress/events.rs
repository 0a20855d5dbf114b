use crate::coordinator::ErrorKind;
use crate::session::SessionStatus;
use serde::Serialize;
use tokio::sync::broadcast;

/// Events published while an upload runs. Every event names its session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum UploadEvent {
    StatusChanged {
        session_id: String,
        status: SessionStatus,
    },
    Progress {
        session_id: String,
        percentage: f64,
        uploaded_bytes: u64,
        total_bytes: u64,
    },
    /// Bytes handed to the connection for one in-flight PUT. Part 0 is the
    /// single direct upload.
    BytesSent {
        session_id: String,
        part_number: u32,
        sent: u64,
        total: u64,
    },
    ChunkCompleted {
        session_id: String,
        part_number: u32,
        etag: String,
        attempts: u32,
    },
    ChunkRetrying {
        session_id: String,
        part_number: u32,
        attempt: u32,
        delay_ms: u64,
    },
    UrlReissued {
        session_id: String,
        part_number: u32,
    },
    /// Emitted exactly once per upload call
    Terminal(TerminalReport),
}

impl UploadEvent {
    pub fn session_id(&self) -> &str {
        match self {
            UploadEvent::StatusChanged { session_id, .. }
            | UploadEvent::Progress { session_id, .. }
            | UploadEvent::BytesSent { session_id, .. }
            | UploadEvent::ChunkCompleted { session_id, .. }
            | UploadEvent::ChunkRetrying { session_id, .. }
            | UploadEvent::UrlReissued { session_id, .. } => session_id,
            UploadEvent::Terminal(report) => &report.session_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadEvent::Terminal(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminalReport {
    pub session_id: String,
    pub status: SessionStatus,
    pub uploaded_bytes: u64,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
}

/// Fan-out of [`UploadEvent`]s to any number of subscribers. Publishing with
/// no subscribers is not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UploadEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: UploadEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
