// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Rolling-window limiter for outbound classification requests

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::{MagicHandError, Result};

/// Allows at most `max_requests` in any rolling `window`, shared by all workers
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1) as usize,
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// `n` requests per minute
    pub fn per_minute(n: u32) -> Self {
        Self::new(n, Duration::from_secs(60))
    }

    /// Take a slot, waiting up to `max_wait` for one to free up. A wait too
    /// long to represent as a deadline means waiting as long as it takes.
    pub async fn acquire(&self, max_wait: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(max_wait);

        loop {
            let wait = match self.try_take().await {
                None => return Ok(()),
                Some(wait) => wait,
            };

            let too_late = deadline.is_some_and(|deadline| {
                Instant::now()
                    .checked_add(wait)
                    .map_or(true, |ready| ready > deadline)
            });
            if too_late {
                return Err(MagicHandError::RemoteClassification(format!(
                    "rate limit of {} requests per {:?} reached",
                    self.max_requests, self.window
                )));
            }

            debug!("Rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a slot if one is free, otherwise return how long until the next one
    async fn try_take(&self) -> Option<Duration> {
        let mut sent = self.sent.lock().await;
        let now = Instant::now();

        while let Some(front) = sent.front() {
            if now.duration_since(*front) >= self.window {
                sent.pop_front();
            } else {
                break;
            }
        }

        if sent.len() < self.max_requests {
            sent.push_back(now);
            return None;
        }

        let oldest = sent.front().copied().unwrap_or(now);
        let wait = oldest
            .checked_add(self.window)
            .map_or(self.window, |free| free.saturating_duration_since(now));
        Some(wait)
    }

    /// Slots free right now
    pub async fn available(&self) -> usize {
        let sent = self.sent.lock().await;
        let now = Instant::now();
        let live = sent
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count();
        self.max_requests.saturating_sub(live)
    }
}
