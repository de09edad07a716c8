// src/utils/http.rs

//! HTTP client utilities shared by the backend clients.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::future::retry_notify;
use reqwest::StatusCode;
use url::Url;

use crate::backends::BackendError;
use crate::error::Result;
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// GET a URL and return its body, mapping non-success statuses to typed failures.
pub async fn fetch_text(client: &reqwest::Client, url: Url) -> std::result::Result<String, BackendError> {
    log::debug!("GET {}", url);
    let response = client.get(url).send().await?;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(BackendError::RateLimited);
    }
    if !status.is_success() {
        return Err(BackendError::Status(status.as_u16()));
    }

    Ok(response.text().await?)
}

/// Retry policy for transient backend failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the first retry; doubles afterwards
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Doubling delays without jitter, capped at 32x the base delay.
    /// Attempts are bounded by [`with_retry`], not by elapsed time.
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.base_delay.saturating_mul(32),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
pub async fn with_retry<F, Fut, T>(
    policy: RetryPolicy,
    context: &str,
    mut operation: F,
) -> std::result::Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, BackendError>>,
{
    let mut attempt = 0;

    retry_notify(
        policy.backoff(),
        || {
            attempt += 1;
            let last = attempt >= policy.attempts;
            let call = operation();
            async move {
                call.await.map_err(|error| {
                    if last || !error.is_transient() {
                        backoff::Error::permanent(error)
                    } else {
                        backoff::Error::transient(error)
                    }
                })
            }
        },
        |error: BackendError, delay: Duration| {
            log::warn!("{} failed: {}. Retrying in {:?}", context, error, delay);
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BackendError::RateLimited)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> = with_retry(fast(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::Malformed("bad".into())) }
        })
        .await;

        assert!(matches!(result, Err(BackendError::Malformed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<(), _> = with_retry(fast(2), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::Status(503)) }
        })
        .await;

        assert!(matches!(result, Err(BackendError::Status(503))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_doubles() {
        use backoff::backoff::Backoff;

        let policy = RetryPolicy {
            attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        let mut backoff = policy.backoff();
        let delays: Vec<u128> = (0..3)
            .map(|_| backoff.next_backoff().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400]);
    }

    #[test]
    fn test_backoff_capped() {
        use backoff::backoff::Backoff;

        let mut backoff = fast(10).backoff();
        let last = (0..10).filter_map(|_| backoff.next_backoff()).last().unwrap();
        assert_eq!(last, Duration::from_millis(32));
    }

    #[test]
    fn test_client_builds() {
        assert!(create_async_client(&HttpConfig::default()).is_ok());
    }
}
