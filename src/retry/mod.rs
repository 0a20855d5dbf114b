pub mod backoff;
pub mod scheduler;

pub use self::backoff::LinearBackoff;
pub use scheduler::{ChunkFailure, RetryNotice, RetryScheduler};

use std::time::Duration;

/// Per-chunk retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Local attempts against one signed URL before a reissue
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}
