//! Sliding-window limiter for job starts

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Admits at most `max` starts within any `window`
pub struct SlidingWindowLimiter {
    max: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max: max.max(1) as usize,
            window,
            starts: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a start if the window has room; otherwise report how long until it does
    async fn admit(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut starts = self.starts.lock().await;

        while let Some(oldest) = starts.front() {
            if now.duration_since(*oldest) >= self.window {
                starts.pop_front();
            } else {
                break;
            }
        }

        if starts.len() < self.max {
            starts.push_back(now);
            return Ok(());
        }

        let oldest = starts.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now))
    }

    /// Take a slot, waiting for the window to slide if necessary
    pub async fn acquire(&self) {
        loop {
            match self.admit().await {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
