use std::future::Future;
use std::time::Duration;

use super::{with_deadline, EnvelopeError};

#[derive(Debug, thiserror::Error)]
#[error("all retry attempts failed: {0}")]
pub struct RetryError(pub EnvelopeError);

/// Invokes `fn` up to `k` times (default 1 retry = 2 attempts). First attempt
/// uses a 30s deadline, the retry attempt 15s (total budget <= 45s). Delay
/// between attempts is exponential starting at 500ms. Retry is taken only when
/// the error is classified retryable; a non-retryable error returns immediately.
pub async fn retry<F, Fut, T>(mut attempt_fn: F) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EnvelopeError>>,
{
    const DEADLINES_MS: [u64; 2] = [30_000, 15_000];
    const INITIAL_DELAY_MS: u64 = 500;

    let mut last_err = EnvelopeError::Timeout;
    for (attempt, deadline_ms) in DEADLINES_MS.iter().enumerate() {
        let fut = attempt_fn();
        let outcome = with_deadline(Duration::from_millis(*deadline_ms), fut).await;
        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(timeout_err) => timeout_err,
        };

        last_err = err;
        let is_last_attempt = attempt + 1 == DEADLINES_MS.len();
        if is_last_attempt || !last_err.is_retryable() {
            break;
        }

        let delay = INITIAL_DELAY_MS * 2u64.pow(attempt as u32);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    Err(RetryError(last_err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_on_retryable_error_and_eventually_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(EnvelopeError::Timeout)
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError> = retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EnvelopeError::from_http_status(400))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_two_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError> = retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EnvelopeError::Timeout)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
