//! Per-chunk retry with signed-URL reissue.
//!
//! A chunk gets `max_attempts` tries against its URL with linear backoff in
//! between. If every try fails the control plane is asked for a fresh URL
//! once, and one final attempt runs against it. Total attempts therefore never
//! exceed `max_attempts + 1` and a chunk is reissued at most once.

use crate::cancel::{run_cancellable, sleep_cancellable, CancellationToken};
use crate::chunk::{ChunkDescriptor, ChunkError, ChunkOutcome, ChunkResult};
use crate::metrics::recorder::{record_chunk_retry, record_url_reissue};
use crate::network::ControlPlane;
use crate::retry::backoff::LinearBackoff;
use crate::retry::RetryPolicy;
use ::backoff::backoff::Backoff;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry activity surfaced to the caller as it happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryNotice {
    Retrying {
        part_number: u32,
        attempt: u32,
        delay: Duration,
    },
    UrlReissued {
        part_number: u32,
    },
}

/// A chunk that ran out of attempts (or was aborted), with the last error
#[derive(Debug)]
pub struct ChunkFailure {
    pub outcome: ChunkOutcome,
    pub error: ChunkError,
}

impl ChunkFailure {
    pub fn new(part_number: u32, attempts: u32, error: ChunkError) -> Self {
        Self {
            outcome: ChunkOutcome::failed(part_number, attempts),
            error,
        }
    }
}

pub struct RetryScheduler {
    control: Arc<dyn ControlPlane>,
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(control: Arc<dyn ControlPlane>, policy: RetryPolicy) -> Self {
        Self { control, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Drive `work` for one chunk until it succeeds or the budget is spent.
    ///
    /// `work` receives the descriptor to use (its URL may have been reissued)
    /// and the 1-based attempt number. With `upload_id == None` no reissue is
    /// attempted, which is how single-PUT uploads are retried.
    pub async fn run_with_retry<F, Fut>(
        &self,
        upload_id: Option<&str>,
        descriptor: ChunkDescriptor,
        cancel: &CancellationToken,
        notice: &(dyn Fn(RetryNotice) + Send + Sync),
        work: F,
    ) -> Result<ChunkOutcome, ChunkFailure>
    where
        F: Fn(ChunkDescriptor, u32) -> Fut,
        Fut: Future<Output = ChunkResult<ChunkOutcome>>,
    {
        let part = descriptor.part_number;
        let max = self.policy.max_attempts.max(1);

        let (error, attempts) = match self
            .attempts(&descriptor, 1..=max, cancel, notice, &work)
            .await
        {
            Ok(outcome) => return Ok(outcome),
            Err(failed) => failed,
        };

        let upload_id = match upload_id {
            Some(id) if error.is_retryable() => id,
            _ => return Err(ChunkFailure::new(part, attempts, error)),
        };

        warn!(part, attempts, %error, "chunk exhausted its URL, requesting a new one");
        let url = match run_cancellable(cancel, self.control.reissue_chunk_url(upload_id, part))
            .await
        {
            Err(_) => return Err(ChunkFailure::new(part, attempts, ChunkError::Aborted)),
            Ok(Err(e)) => {
                let error = ChunkError::UrlReissue {
                    part,
                    message: e.to_string(),
                };
                return Err(ChunkFailure::new(part, attempts, error));
            }
            Ok(Ok(url)) => url,
        };

        record_url_reissue();
        info!(part, "chunk URL reissued");
        notice(RetryNotice::UrlReissued { part_number: part });

        let reissued = descriptor.with_url(url);
        self.attempts(&reissued, max + 1..=max + 1, cancel, notice, &work)
            .await
            .map_err(|(error, attempts)| ChunkFailure::new(part, attempts, error))
    }

    /// Run the numbered attempts in `range`, sleeping between failures.
    /// On failure returns the last error and the number of attempts made.
    async fn attempts<F, Fut>(
        &self,
        descriptor: &ChunkDescriptor,
        range: RangeInclusive<u32>,
        cancel: &CancellationToken,
        notice: &(dyn Fn(RetryNotice) + Send + Sync),
        work: &F,
    ) -> Result<ChunkOutcome, (ChunkError, u32)>
    where
        F: Fn(ChunkDescriptor, u32) -> Fut,
        Fut: Future<Output = ChunkResult<ChunkOutcome>>,
    {
        let part = descriptor.part_number;
        let last = *range.end();
        let mut backoff = LinearBackoff::new(self.policy.base_delay);
        let mut made = range.start().saturating_sub(1);

        for attempt in range {
            if cancel.is_cancelled() {
                return Err((ChunkError::Aborted, made));
            }

            made = attempt;
            let error = match work(descriptor.clone(), attempt).await {
                Ok(outcome) => return Ok(outcome.with_attempts(attempt)),
                Err(e) if !e.is_retryable() => return Err((e, attempt)),
                Err(e) => e,
            };

            if attempt == last {
                return Err((error, attempt));
            }

            let delay = backoff.next_backoff().unwrap_or(self.policy.base_delay);
            record_chunk_retry();
            warn!(part, attempt, delay_ms = delay.as_millis() as u64, %error, "chunk attempt failed, retrying");
            notice(RetryNotice::Retrying {
                part_number: part,
                attempt,
                delay,
            });

            if sleep_cancellable(cancel, delay).await.is_err() {
                return Err((ChunkError::Aborted, attempt));
            }
        }

        Err((ChunkError::Aborted, made))
    }
}
