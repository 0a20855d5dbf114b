//! Upload bandwidth limiting using the governor crate

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Limiter granularity: one cell is one KiB.
const UNIT_BYTES: usize = 1024;

/// Caps the byte rate of all chunk PUTs sharing this limiter
pub struct TransferRateLimiter {
    bytes_limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    /// Largest number of cells the quota admits at once
    burst: u32,
}

impl TransferRateLimiter {
    /// Create a limiter for `bytes_per_second` (0 = unlimited)
    pub fn new(bytes_per_second: u32) -> Self {
        if bytes_per_second == 0 {
            return Self::unlimited();
        }

        let kib_per_second = ((bytes_per_second as usize / UNIT_BYTES).max(1)) as u32;
        let per_second = NonZeroU32::new(kib_per_second).unwrap_or(NonZeroU32::MIN);

        Self {
            bytes_limiter: Some(Arc::new(RateLimiter::direct(Quota::per_second(per_second)))),
            burst: per_second.get(),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            bytes_limiter: None,
            burst: 0,
        }
    }

    /// Wait until `bytes` more may be sent
    pub async fn wait_for_bytes(&self, bytes: usize) {
        let Some(limiter) = &self.bytes_limiter else {
            return;
        };

        let mut remaining = bytes.div_ceil(UNIT_BYTES).max(1) as u32;
        while remaining > 0 {
            let step = remaining.min(self.burst);
            if let Some(n) = NonZeroU32::new(step) {
                // step never exceeds the burst, so capacity is always sufficient
                let _ = limiter.until_n_ready(n).await;
            }
            remaining -= step;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bytes_limiter.is_some()
    }
}

impl Default for TransferRateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl Clone for TransferRateLimiter {
    fn clone(&self) -> Self {
        Self {
            bytes_limiter: self.bytes_limiter.clone(),
            burst: self.burst,
        }
    }
}
