use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Reads byte ranges of the source file on demand, so a chunk's bytes are
/// held only while it is in flight.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    path: PathBuf,
}

impl ChunkReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the inclusive range `start..=end`.
    pub async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Bytes> {
        let len = (end - start + 1) as usize;
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }

    pub async fn read_all(&self) -> std::io::Result<Bytes> {
        Ok(Bytes::from(tokio::fs::read(&self.path).await?))
    }
}
