//! Minimum-interval rate limiter for outbound service calls

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Spaces calls at least `min_interval` apart
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
    name: &'static str,
}

impl RateLimiter {
    pub fn new(name: &'static str, min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
            name,
        }
    }

    /// Wait until the next call is allowed, then claim the slot
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!(service = self.name, ?wait_time, "Rate limiting");
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_call_does_not_wait() {
        let limiter = RateLimiter::new("test", 1000);
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_second_call_is_spaced() {
        let limiter = RateLimiter::new("test", 50);
        limiter.wait().await;
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
