//! Retry policy for AWS writes: throttling-class errors back off
//! exponentially from 200 ms, doubling per attempt with jitter added on top
//! of the deterministic floor, bounded by an attempt count and a wall-clock
//! budget. Non-throttling errors surface immediately. Every attempt takes a
//! fresh token from the sink's bucket; sleeps never refund one.

use crate::aws::{AwsApiError, AwsApiResult};
use crate::rate_limiter::TokenBucket;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_elapsed: Duration
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_elapsed: Duration::from_secs(30)
        }
    }
}

pub async fn retry_throttled<T, F, Fut>(
    policy: &RetryPolicy,
    limiter: &TokenBucket,
    mut operation: F
) -> AwsApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AwsApiResult<T>>
{
    let started = Instant::now();
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1u32;

    loop {
        limiter.acquire().await;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_throttling() => {
                let exhausted = attempt >= policy.max_attempts
                    || started.elapsed() + backoff >= policy.max_elapsed;
                if exhausted {
                    return Err(err);
                }
                let delay = backoff + backoff.mul_f64(rand::random::<f64>());
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "AWS throttled the request; backing off"
                );
                tokio::time::sleep(delay).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err)
        }
    }
}
