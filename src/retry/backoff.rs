use ::backoff::backoff::Backoff;
use std::time::Duration;

/// Linearly growing delays: `base`, `2*base`, `3*base`, ...
///
/// Never gives up on its own. The caller bounds the number of attempts.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    step: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, step: 0 }
    }
}

impl Backoff for LinearBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.step = self.step.saturating_add(1);
        Some(self.base.saturating_mul(self.step))
    }

    fn reset(&mut self) {
        self.step = 0;
    }
}
