//! Gateway-internal adaptive retry for DynamoDB calls: base 200ms, capped at
//! 5s, up to a configurable attempt ceiling (`MAX_RETRIES`). This is the
//! only retry loop left in the pipeline — LMM calls are single-shot at
//! stage level, so every transport retry that still happens here is for a
//! single key-value operation's own transient failures (throttling,
//! transaction conflicts).

use std::time::Duration;

use tracing::warn;
use vmv_core::Error;

const BASE_DELAY: Duration = Duration::from_millis(200);
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Default attempt ceiling, used by call sites that don't thread
/// `MAX_RETRIES` through explicitly (tests, mostly).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Run `op` up to `max_attempts` times, backing off exponentially (capped at
/// `MAX_DELAY`) between attempts while the returned error is retryable.
pub async fn with_adaptive_retry<T, F, Fut>(operation: &str, max_attempts: u32, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable() && attempt < max_attempts => {
                let delay = (BASE_DELAY * 2u32.pow(attempt - 1)).min(MAX_DELAY);
                warn!(operation, attempt, delay_ms = delay.as_millis() as u64, "retrying key-value operation");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err.with_attempt(attempt, max_attempts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_adaptive_retry("test", DEFAULT_MAX_ATTEMPTS, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_on_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_adaptive_retry("test", DEFAULT_MAX_ATTEMPTS, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::from_vendor_code("ThrottlingException", "slow down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn custom_attempt_ceiling_is_honored() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_adaptive_retry("test", 2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::from_vendor_code("ThrottlingException", "slow down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_adaptive_retry("test", DEFAULT_MAX_ATTEMPTS, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::validation("bad field")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
