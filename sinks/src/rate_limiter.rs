//! Token-bucket rate limiter. Capacity is one second's worth of tokens so a
//! burst can never exceed the configured per-second rate; refill is steady.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refilled_at: Instant
}

impl TokenBucket {
    pub fn new(rate_per_second: f64) -> Self {
        let capacity = rate_per_second.max(1.0);
        Self {
            rate: rate_per_second,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now()
            })
        }
    }

    /// Take one token, sleeping until the bucket refills if necessary.
    /// Tokens are never refunded; a retry must acquire again.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
                state.refilled_at = now;
                state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                (1.0 - state.tokens) / self.rate
            };
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}
