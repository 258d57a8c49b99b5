//! Shared HTTP client with bounded retry
//!
//! Listing pages and API batches both go through [`HttpClient`], so they share
//! one connection pool, one timeout and one [`RetryPolicy`].

use reqwest::{Client, StatusCode};
use std::future::Future;
use tracing::{debug, warn};
use url::Url;

use crate::config::{IngestConfig, RetryLimit, RetryPolicy};
use crate::{IngestError, Result};

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            retry: config.retry,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Single GET returning the body as text.
    ///
    /// `202 Accepted` means the API queued the request and has no body yet,
    /// which is reported as [`IngestError::Queued`].
    pub async fn get_text(&self, url: &Url) -> Result<String> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::ACCEPTED {
            return Err(IngestError::Queued {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(IngestError::Status {
                status,
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// GET with retry on transient failures
    pub async fn get_text_with_retry(&self, url: &Url) -> Result<String> {
        self.retry(url.as_str(), || self.get_text(url)).await
    }

    /// Run `op` until it succeeds, fails fatally, or the retry policy is spent.
    ///
    /// `what` names the request in log lines.
    pub async fn retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(self.retry, what, op).await
    }
}

/// Retry loop shared by every request kind
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                match policy.limit {
                    RetryLimit::Bounded(max) => {
                        warn!("Attempt {}/{} for {} failed: {}", attempt, max, what, e)
                    },
                    RetryLimit::Unbounded => warn!("Attempt {} for {} failed: {}", attempt, what, e),
                }

                if !policy.allows_retry(attempt) {
                    return Err(IngestError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }

                if let Some(delay) = policy.delay() {
                    tokio::time::sleep(delay).await;
                }
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Backoff;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn bounded(max: u32) -> RetryPolicy {
        RetryPolicy {
            limit: RetryLimit::Bounded(max),
            backoff: Backoff::None,
        }
    }

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(bounded(5), "test", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(IngestError::MalformedDocument("truncated".into()))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_at_bound() {
        let calls = &AtomicU32::new(0);
        let err = with_retry(bounded(4), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(IngestError::Queued { url: "u".into() })
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            IngestError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, IngestError::Queued { .. }));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = with_retry(bounded(10), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(IngestError::Config("bad".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_backoff_waits_between_attempts() {
        let policy = RetryPolicy {
            limit: RetryLimit::Bounded(3),
            backoff: Backoff::Fixed(500),
        };
        let start = tokio::time::Instant::now();
        let _ = with_retry(policy, "test", || async {
            Err::<(), _>(IngestError::MalformedDocument("x".into()))
        })
        .await;

        assert!(start.elapsed() >= std::time::Duration::from_millis(1000));
    }
}
