//! Cancellable retry with bounded exponential backoff.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::error::{ProvisioningError, Result};

/// Runs `op` until it succeeds, fails with a non-retryable error, or runs out
/// of attempts.
///
/// Only the wait between attempts races against `token`; an attempt that is
/// already in flight runs to completion. Exhaustion is reported as
/// [`ProvisioningError::RetryExhausted`] carrying the last error.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(ProvisioningError::Cancelled);
    }

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= max_attempts {
            return Err(ProvisioningError::RetryExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                last_error: err.to_string(),
            });
        }

        let delay = policy.backoff_for(attempt);
        metrics::counter!("provisioning_retries_total", "operation" => operation.to_string())
            .increment(1);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient failure"
        );

        tokio::select! {
            biased;
            () = token.cancelled() => return Err(ProvisioningError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
