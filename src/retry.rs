//! Bounded retry with a fixed delay, and the request executor built on it.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::Level;
use url::Url;

use crate::error::{Error, Result};
use crate::log::LogSink;
use crate::rate_limit::RateLimitTracker;
use crate::transport::Transport;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is used up.
///
/// The closure receives the 1-based attempt number. Every failed attempt is
/// reported to `sink`; so is a success that follows a failure and the final
/// give-up. The wait between attempts suspends only the calling task.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sink: &dyn LogSink,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    sink.log(
                        Level::INFO,
                        &format!("{}: recovered on attempt {}", label, attempt),
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                sink.log(
                    Level::WARN,
                    &format!("{}: attempt {}/{} failed: {}", label, attempt, max_attempts, e),
                );
                if attempt >= max_attempts {
                    sink.log(
                        Level::ERROR,
                        &format!("{}: giving up after {} attempts: {}", label, attempt, e),
                    );
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Decoded response of a successful request.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: u16,
    pub body: Value,
    pub header_lines: Vec<String>,
}

/// Runs one logical GET through a [`Transport`] under a [`RetryPolicy`].
///
/// An attempt succeeds only when the body decodes as JSON; anything else
/// (network error, timeout, HTML error page) is retried. Quota headers of
/// every response the transport returns are recorded, whatever its status
/// or body.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute(
        &self,
        url: &Url,
        headers: &[(String, String)],
        sink: &dyn LogSink,
        rate_limits: &RateLimitTracker,
    ) -> Result<JsonResponse> {
        let label = format!("GET {}", url.path());
        let transport = &self.transport;
        run_with_retry(&self.policy, sink, &label, |_| async move {
            let raw = transport.get(url, headers).await?;
            record_rate_limits(rate_limits, &raw.header_lines, sink);
            let body: Value = serde_json::from_str(&raw.body)?;
            Ok(JsonResponse {
                status: raw.status,
                body,
                header_lines: raw.header_lines,
            })
        })
        .await
    }
}

fn record_rate_limits(rate_limits: &RateLimitTracker, header_lines: &[String], sink: &dyn LogSink) {
    let snapshot = rate_limits.record(header_lines);
    if snapshot.is_exhausted() {
        let reset = snapshot
            .reset_at
            .map_or_else(|| "unknown".to_string(), |at| at.to_string());
        sink.log(
            Level::WARN,
            &format!("Rate limit reached; quota resets at {}", reset),
        );
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
