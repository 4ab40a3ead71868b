use std::future::Future;

use super::DeadLetterLog;

/// Catch-and-fallback. Runs `fn`; on failure logs with `context` and returns
/// `fallback`. When `dead_letter` carries a payload the failure is appended to
/// the dead-letter log. `debug_mode` re-throws instead of swallowing, matching
/// spec §4.1 / §6 `DEBUG_ERRORS`.
pub async fn safe_call<F, Fut, T, E>(
    context: &str,
    fallback: T,
    dead_letter: Option<(&DeadLetterLog, &serde_json::Value)>,
    debug_mode: bool,
    fut: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match fut().await {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!("{context} failed: {err}");
            if let Some((log, payload)) = dead_letter {
                log.append(context, payload, &err.to_string(), None).await;
            }
            if debug_mode {
                Err(err)
            } else {
                Ok(fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_fallback_on_failure() {
        let result: Result<i32, &str> =
            safe_call("test.op", -1, None, false, || async { Err("boom") }).await;
        assert_eq!(result.unwrap(), -1);
    }

    #[tokio::test]
    async fn rethrows_in_debug_mode() {
        let result: Result<i32, &str> =
            safe_call("test.op", -1, None, true, || async { Err("boom") }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn passes_through_success() {
        let result: Result<i32, &str> =
            safe_call("test.op", -1, None, false, || async { Ok(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }
}
