//! Bounded retry for transient provider failures (spec.md §7
//! `PROVIDER_UNAVAILABLE — transient, retried up to N; then surfaced
//! per-source`). Rate limiting has its own backoff path in the sync
//! workers and is never retried here.

use std::time::Duration;

use crate::error::SyncError;

const MAX_PROVIDER_ATTEMPTS: u32 = 3;

/// Retry `attempt` up to [`MAX_PROVIDER_ATTEMPTS`] times on
/// `ProviderUnavailable`, with a short backoff between tries. The final
/// error carries the real attempt count; any other error variant
/// (rate limiting, auth) is returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(mut attempt: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SyncError>>,
{
    let mut last_reason = String::new();
    for n in 1..=MAX_PROVIDER_ATTEMPTS {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(SyncError::ProviderUnavailable { reason, .. }) => {
                last_reason = reason;
                if n < MAX_PROVIDER_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(50 * n as u64)).await;
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(SyncError::ProviderUnavailable {
        attempts: MAX_PROVIDER_ATTEMPTS,
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 2 {
                Err(SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: "boom".to_string(),
                })
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn surfaces_real_attempt_count_on_exhaustion() {
        let calls = AtomicU32::new(0);
        let err = with_retry::<_, _, ()>(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::ProviderUnavailable {
                attempts: 1,
                reason: "still down".to_string(),
            })
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), MAX_PROVIDER_ATTEMPTS);
        match err {
            SyncError::ProviderUnavailable { attempts, .. } => assert_eq!(attempts, MAX_PROVIDER_ATTEMPTS),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn does_not_retry_rate_limiting() {
        let calls = AtomicU32::new(0);
        let err = with_retry::<_, _, ()>(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::RateLimited { retry_after_secs: 5 })
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, SyncError::RateLimited { .. }));
    }
}
