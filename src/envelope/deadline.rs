use std::future::Future;
use std::time::Duration;

use super::EnvelopeError;

/// Wraps a single outbound RPC with a cancellation deadline of `t`. Fails with
/// `TIMEOUT` if no response arrives within `t`; the in-flight future is dropped
/// on timeout, which cancels it the way the teacher's token-refresh calls are
/// bounded by `reqwest`'s own client timeout, generalized to an explicit deadline
/// per call site.
pub async fn with_deadline<F, T>(t: Duration, fut: F) -> Result<T, EnvelopeError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(t, fut)
        .await
        .map_err(|_| EnvelopeError::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_within_deadline() {
        let result = with_deadline(Duration::from_millis(50), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn times_out_when_too_slow() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            42
        })
        .await;
        assert!(matches!(result, Err(EnvelopeError::Timeout)));
    }
}
