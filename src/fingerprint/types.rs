use serde::{Deserialize, Serialize};

/// Content identity of a local file.
///
/// `full_hash` is the SHA-256 of every byte and is the only value fit for
/// equality decisions. `sparse_hash` covers a handful of samples plus the size
/// and is a cheap pre-filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFingerprint {
    pub sparse_hash: String,
    pub full_hash: String,
    pub size_bytes: u64,
}

impl FileFingerprint {
    /// Exact content match. Sparse hashes are deliberately not consulted.
    pub fn same_content(&self, other: &FileFingerprint) -> bool {
        self.size_bytes == other.size_bytes && self.full_hash == other.full_hash
    }

    /// Fast pre-filter: `false` means the contents certainly differ.
    pub fn may_match(&self, other: &FileFingerprint) -> bool {
        self.size_bytes == other.size_bytes && self.sparse_hash == other.sparse_hash
    }
}
