//! Provider rate limiting and retry.
//!
//! Each provider gets one [`RateLimiter`] gate: a concurrency cap plus a
//! minimum spacing between dispatches. Callers acquire a permit before every
//! request; [`with_backoff`] wraps the request itself and retries rate-limit
//! errors with exponential backoff, preferring the server-reported delay
//! when one was sent.

use crate::error::{LlmError, Result};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Per-provider dispatch gate.
#[derive(Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    min_interval: Duration,
    last_dispatch: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_concurrent` in-flight requests with at
    /// least `min_interval` between dispatches.
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            min_interval,
            last_dispatch: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait for a dispatch slot. The returned permit must be held for the
    /// duration of the provider call.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // Semaphore is never closed, so acquire cannot fail.
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("rate limiter semaphore closed"));

        let mut last = self.last_dispatch.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }
        *last = Some(Instant::now());

        permit
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        // Conservative default: 4 concurrent calls, 250ms apart.
        Self::new(4, Duration::from_millis(250))
    }
}

/// Run `op` with exponential backoff on retryable errors.
///
/// Rate-limit errors wait for the server-reported `retry_after` when present,
/// otherwise an exponential delay with jitter. Non-retryable errors return
/// immediately. After `max_attempts` the last error is wrapped in
/// [`LlmError::RetriesExhausted`].
pub async fn with_backoff<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(500);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let wait = match &err {
                    LlmError::RateLimited {
                        retry_after: Some(server_delay),
                        ..
                    } => (*server_delay).max(delay),
                    _ => delay,
                };
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
                tracing::warn!(
                    attempt,
                    max_attempts,
                    wait_ms = (wait + jitter).as_millis() as u64,
                    error = %err,
                    "LLM call failed, backing off"
                );
                tokio::time::sleep(wait + jitter).await;
                delay = (delay * 2).min(Duration::from_secs(30));
                last_error = err.to_string();
            }
            Err(err) if err.is_retryable() => {
                return Err(LlmError::RetriesExhausted {
                    attempts: max_attempts,
                    last_error: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    Err(LlmError::RetriesExhausted {
        attempts: max_attempts,
        last_error,
    })
}

/// A [`ChatModel`] wrapper that waits on a [`RateLimiter`] gate and retries
/// with [`with_backoff`] around every call.
///
/// [`ChatModel`]: crate::ChatModel
pub struct GatedChatModel {
    inner: std::sync::Arc<dyn crate::ChatModel>,
    limiter: RateLimiter,
    max_attempts: u32,
}

impl GatedChatModel {
    pub fn new(inner: std::sync::Arc<dyn crate::ChatModel>, limiter: RateLimiter) -> Self {
        Self {
            inner,
            limiter,
            max_attempts: 5,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

#[async_trait::async_trait]
impl crate::ChatModel for GatedChatModel {
    async fn chat(&self, request: crate::ChatRequest) -> Result<crate::ChatResponse> {
        let _permit = self.limiter.acquire().await;
        with_backoff(self.max_attempts, || self.inner.chat(request.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_backoff_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, LlmError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_gives_up_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Authentication("bad key".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(LlmError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_retries_rate_limits_until_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(LlmError::RateLimited {
                    message: "slow down".to_string(),
                    retry_after: None,
                })
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(LlmError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limiter_caps_concurrency() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let first = limiter.acquire().await;
        assert_eq!(limiter.permits.available_permits(), 0);
        drop(first);
        let _second = limiter.acquire().await;
    }
}
