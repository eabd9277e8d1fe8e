//! Minimum spacing between external calls, shared by every worker.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until `min_interval` has passed since the previous call from any
    /// task, then claim the slot. Returns the instant the slot was claimed.
    ///
    /// The lock is held across the sleep, so reading the last call time and
    /// recording the new one happen in one critical section.
    pub async fn acquire(&self) -> Instant {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        let now = Instant::now();
        *last_call = Some(now);
        now
    }
}
