//! Request pacing for the upstream API.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Fixed-spacing rate limiter.
///
/// Guarantees at least `60 / max_per_minute` seconds between the starts of
/// two successive calls to [`RequestRateLimiter::wait`]. There is no burst
/// allowance: the first call passes immediately, every later call sleeps
/// until the full interval since the previous one has elapsed.
#[derive(Debug)]
pub struct RequestRateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestRateLimiter {
    /// Create a limiter allowing `max_per_minute` calls per minute.
    ///
    /// A value of zero is treated as one.
    #[must_use]
    pub fn per_minute(max_per_minute: u32) -> Self {
        Self::with_interval(Duration::from_secs(60) / max_per_minute.max(1))
    }

    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next call is allowed.
    pub async fn wait(&self) {
        // Holding the lock across the sleep serializes concurrent callers.
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                let delay = ready_at - Instant::now();
                trace!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Rate limit pause"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
