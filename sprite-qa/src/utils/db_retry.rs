//! Lock-contention retry for job status transitions
//!
//! The worker loop and manual `/jobs/process` calls can race on the same
//! `analysis_jobs` rows; SQLite answers with `database is locked` and the
//! statement is simply tried again.

use sprite_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

const FIRST_DELAY: Duration = Duration::from_millis(10);
const MAX_DELAY: Duration = Duration::from_secs(1);

/// Doubling delays, 10 ms up to 1 s
#[derive(Debug, Clone)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self { next: FIRST_DELAY }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_DELAY);
        delay
    }
}

/// Run `operation` until it stops failing on lock contention or
/// `max_wait_ms` has passed. Other errors are returned on first sight.
pub async fn retry_on_lock<F, Fut, T>(label: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Duration::from_millis(max_wait_ms);
    let started = Instant::now();
    let mut backoff = Backoff::new();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::debug!(label, attempts, "Lock cleared");
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        let waited = started.elapsed();
        if waited >= deadline {
            tracing::error!(label, attempts, waited_ms = waited.as_millis() as u64, %err, "Giving up on locked database");
            return Err(Error::Internal(format!(
                "{}: database still locked after {} attempts",
                label, attempts
            )));
        }

        let delay = backoff.next_delay();
        tracing::warn!(label, attempts, delay_ms = delay.as_millis() as u64, "Database locked");
        tokio::time::sleep(delay).await;
    }
}
