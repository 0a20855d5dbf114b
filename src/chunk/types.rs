use serde::{Deserialize, Serialize};

/// One part of a chunked upload and the signed URL it goes to.
///
/// `end_byte` is inclusive. Only `upload_url` ever changes, when the URL is
/// reissued after repeated failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub part_number: u32,
    pub start_byte: u64,
    pub end_byte: u64,
    pub upload_url: String,
}

impl ChunkDescriptor {
    /// Size of the inclusive byte range
    pub fn byte_len(&self) -> u64 {
        self.end_byte - self.start_byte + 1
    }

    pub fn with_url(&self, upload_url: String) -> Self {
        Self {
            upload_url,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkOutcome {
    pub part_number: u32,
    /// Quote-stripped and non-empty on success, empty on failure
    pub etag: String,
    pub status: ChunkStatus,
    pub attempts: u32,
}

impl ChunkOutcome {
    pub fn succeeded(part_number: u32, etag: String, attempts: u32) -> Self {
        Self {
            part_number,
            etag,
            status: ChunkStatus::Succeeded,
            attempts,
        }
    }

    pub fn failed(part_number: u32, attempts: u32) -> Self {
        Self {
            part_number,
            etag: String::new(),
            status: ChunkStatus::Failed,
            attempts,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == ChunkStatus::Succeeded
    }

    pub fn with_attempts(self, attempts: u32) -> Self {
        Self { attempts, ..self }
    }
}
