//! Cooperative cancellation shared by every suspension point of an upload.

use std::future::Future;

pub use tokio_util::sync::CancellationToken;

/// Error returned when a cancellable operation observed its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation aborted")]
pub struct Aborted;

/// Runs `fut` unless `token` fires first.
///
/// A token that is already cancelled wins without polling `fut`, so no new
/// work starts after cancellation.
pub async fn run_cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, Aborted>
where
    F: Future<Output = T>,
{
    if token.is_cancelled() {
        return Err(Aborted);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Aborted),
        out = fut => Ok(out),
    }
}

/// Sleeps for `delay` unless `token` fires first.
pub async fn sleep_cancellable(
    token: &CancellationToken,
    delay: std::time::Duration,
) -> Result<(), Aborted> {
    run_cancellable(token, tokio::time::sleep(delay)).await
}
