//! Retry combinator and retry-wrapped fetcher
//!
//! One combinator, parameterized by a retry predicate, a backoff policy and
//! an attempt budget, is shared by every outbound call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::AnalystError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::Result;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay after a failed attempt: `base_delay * 2^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the
/// attempt budget runs out.
///
/// `op` receives the zero-based attempt index. Retryable failures sleep
/// `policy.backoff(attempt)` before the next attempt; no sleep follows the
/// final attempt. Exhaustion yields `FetchExhausted` carrying the last
/// error's message.
pub async fn retry<T, F, Fut, P>(
    label: &str,
    policy: &RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&AnalystError) -> bool,
{
    let mut last_error: Option<AnalystError> = None;

    for attempt in 0..policy.max_attempts {
        debug!(
            endpoint = label,
            attempt = attempt + 1,
            max_attempts = policy.max_attempts,
            "Calling endpoint"
        );

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                let remaining = attempt + 1 < policy.max_attempts;

                if remaining {
                    let delay = policy.backoff(attempt);
                    warn!(
                        endpoint = label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, backing off"
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                } else {
                    warn!(endpoint = label, attempt = attempt + 1, error = %e, "Final attempt failed");
                    last_error = Some(e);
                }
            }
        }
    }

    Err(AnalystError::FetchExhausted {
        endpoint: label.to_string(),
        attempts: policy.max_attempts,
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts were made".to_string()),
    })
}

/// Wraps a transport with the retry combinator and uniform status handling
#[derive(Clone)]
pub struct RetryableFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryableFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `request`, retrying per policy, and validate the body with `parse`.
    ///
    /// A 429 short-circuits to `RateLimited` before the body is inspected.
    pub async fn fetch<T, F>(&self, label: &str, request: &HttpRequest, parse: F) -> Result<T>
    where
        F: Fn(&HttpResponse) -> Result<T>,
    {
        let transport = self.transport.as_ref();
        let parse = &parse;

        retry(label, &self.policy, AnalystError::is_transient, move |_attempt| async move {
            let response = transport.send(request).await?;

            if response.is_rate_limited() {
                return Err(AnalystError::RateLimited(label.to_string()));
            }

            if !response.is_success() {
                return Err(AnalystError::UnexpectedStatus {
                    status: response.status,
                    body: response.body,
                });
            }

            parse(&response)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_and_respects_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route_always("/simple/price", HttpResponse::new(429, "slow down"));

        let fetcher = RetryableFetcher::new(transport.clone(), RetryPolicy::default());
        let started = Instant::now();

        let result = fetcher
            .fetch("coingecko price", &HttpRequest::get("http://cg/simple/price"), |r| r.json())
            .await;

        match result {
            Err(AnalystError::FetchExhausted { attempts, message, .. }) => {
                assert_eq!(attempts, 3);
                assert!(message.contains("Rate limited"));
            }
            other => panic!("expected FetchExhausted, got {:?}", other.map(|_| ())),
        }

        let sent = transport.sent_at();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1] - sent[0], Duration::from_millis(1000));
        assert_eq!(sent[2] - sent[1], Duration::from_millis(2000));
        // no trailing sleep after the last attempt
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            "/simple/price",
            vec![
                HttpResponse::new(429, ""),
                HttpResponse::new(500, "oops"),
                HttpResponse::new(200, r#"{"ok":true}"#),
            ],
        );

        let fetcher = RetryableFetcher::new(transport.clone(), RetryPolicy::default());
        let value = fetcher
            .fetch("coingecko price", &HttpRequest::get("http://cg/simple/price"), |r| r.json())
            .await;

        let value = tokio_test::assert_ok!(value);
        assert_eq!(value["ok"], true);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_body_exhausts_with_last_message() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route_always("/market_chart", HttpResponse::new(200, r#"{"nope":1}"#));

        let fetcher = RetryableFetcher::new(transport.clone(), RetryPolicy::default());
        let result: Result<()> = fetcher
            .fetch("coingecko chart", &HttpRequest::get("http://cg/market_chart"), |_| {
                Err(AnalystError::MalformedResponse("missing prices array".into()))
            })
            .await;

        let err = tokio_test::assert_err!(result);
        assert!(err.to_string().contains("missing prices array"));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry("gemini", &RetryPolicy::default(), AnalystError::is_transient, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AnalystError::ConfigError("GEMINI_API_KEY not configured".into())) }
        })
        .await;

        assert!(matches!(result, Err(AnalystError::ConfigError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempt_budget() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        let result: Result<()> = retry("noop", &policy, AnalystError::is_transient, |_| async {
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AnalystError::FetchExhausted { attempts: 0, .. })));
    }
}
