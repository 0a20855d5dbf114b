use crate::fingerprint::error::{FingerprintError, FingerprintResult};
use crate::fingerprint::types::FileFingerprint;
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Default sparse-hash sample size (1 MiB).
pub const DEFAULT_SAMPLE_SIZE: u64 = 1024 * 1024;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Computes [`FileFingerprint`]s. Never touches the network.
#[derive(Debug, Clone)]
pub struct FingerprintEngine {
    sample_size: u64,
}

impl Default for FingerprintEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

impl FingerprintEngine {
    pub fn new(sample_size: u64) -> Self {
        Self {
            sample_size: sample_size.max(1),
        }
    }

    pub fn sample_size(&self) -> u64 {
        self.sample_size
    }

    /// Byte ranges `(offset, len)` fed to the sparse hash, in digest order.
    ///
    /// Files of `size <= sample_size` are sampled whole. Larger files are
    /// sampled at `0`, `size/3`, `2*size/3` and `size - sample_size`, each
    /// capped at `sample_size` bytes. Samples may overlap on small files.
    pub fn sample_ranges(&self, size: u64) -> Vec<(u64, u64)> {
        if size <= self.sample_size {
            return vec![(0, size)];
        }

        [0, size / 3, 2 * size / 3, size - self.sample_size]
            .into_iter()
            .map(|offset| {
                let start = offset.min(size);
                (start, self.sample_size.min(size - start))
            })
            .collect()
    }

    /// Fingerprint an in-memory buffer. Produces exactly what
    /// [`compute_fingerprint`](Self::compute_fingerprint) yields for a file with
    /// the same bytes.
    pub fn fingerprint_bytes(&self, data: &[u8]) -> FileFingerprint {
        let size = data.len() as u64;

        let mut sparse = Sha256::new();
        for (offset, len) in self.sample_ranges(size) {
            sparse.update(&data[offset as usize..(offset + len) as usize]);
        }
        sparse.update(size.to_string().as_bytes());

        FileFingerprint {
            sparse_hash: hex::encode(sparse.finalize()),
            full_hash: hex::encode(Sha256::digest(data)),
            size_bytes: size,
        }
    }

    /// Compute both hashes of the file at `path`.
    ///
    /// Any read failure aborts the whole fingerprint.
    pub async fn compute_fingerprint(&self, path: &Path) -> FingerprintResult<FileFingerprint> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| FingerprintError::FileNotFound(format!("{}: {}", path.display(), e)))?
            .len();

        let sparse_hash = self.sparse_hash(path, size).await?;
        let full_hash = Self::full_hash(path, size).await?;

        tracing::debug!(
            path = %path.display(),
            size,
            sparse = %sparse_hash,
            "fingerprint computed"
        );

        Ok(FileFingerprint {
            sparse_hash,
            full_hash,
            size_bytes: size,
        })
    }

    async fn sparse_hash(&self, path: &Path, size: u64) -> FingerprintResult<String> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = Vec::new();

        for (offset, len) in self.sample_ranges(size) {
            buffer.resize(len as usize, 0);
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buffer).await?;
            hasher.update(&buffer);
        }
        hasher.update(size.to_string().as_bytes());

        Ok(hex::encode(hasher.finalize()))
    }

    /// Streaming SHA-256 over the whole file.
    async fn full_hash(path: &Path, expected_size: u64) -> FingerprintResult<String> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut read_total = 0u64;

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            read_total += n as u64;
        }

        if read_total != expected_size {
            return Err(FingerprintError::SizeChanged {
                expected: expected_size,
                actual: read_total,
            });
        }

        Ok(hex::encode(hasher.finalize()))
    }
}
