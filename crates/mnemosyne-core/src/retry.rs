//! Backoff retry, scoped exclusively to the LLM client boundary (§7, §9
//! "Retry discipline"). Nothing outside `llm/` should import this —
//! persistence and transport failures propagate immediately and are never
//! retried by application code; the job broker doesn't retry either
//! (`attempts: 1`).

use mnemosyne_common::error::LlmError;
use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;

pub async fn with_backoff<T, F, Fut>(operation: &str, mut f: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = (BASE_DELAY * 2u32.pow(attempt - 1)).min(MAX_DELAY);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient LLM error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(LlmError::Transient(anyhow::anyhow!("timeout")))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_deterministic_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, LlmError> = with_backoff("test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Deterministic(anyhow::anyhow!("bad schema")))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
