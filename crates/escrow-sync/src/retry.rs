//! Caller-level retry of ledger mirroring.
//!
//! The schedule is [`escrow_core::Backoff`]; only errors for which
//! [`SyncError::is_retryable`] holds are retried.

use std::future::Future;

use crate::error::SyncError;

/// Backoff applied to premium mirroring requests.
pub use escrow_core::Backoff as RetryPolicy;

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts ([`SyncError::RetryExhausted`]).
pub(crate) async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() => {
                if !policy.has_next(attempt) {
                    return Err(SyncError::RetryExhausted {
                        attempts: policy.attempts(),
                        last: Box::new(e),
                    });
                }
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.attempts(),
                    "blockchain sync failed, retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
