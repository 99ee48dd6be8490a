//! Fixed-window counter record.

use std::time::Duration;
use tokio::time::Instant;

/// Request count for one token within its current fixed window.
///
/// A window is anchored at the first request after the previous one expired
/// and lasts exactly the interval it was opened with. The record carries no
/// lock of its own; callers hold exclusive access while mutating it.
#[derive(Debug, Clone)]
pub struct CounterRecord {
    /// Requests observed in the current window
    count: u64,
    /// When the current window started
    window_start: Instant,
    /// Length of the current window
    interval: Duration,
}

impl CounterRecord {
    /// Open a new, empty window at `now`.
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            interval,
        }
    }

    /// Record one request at `now` and return the post-increment count.
    ///
    /// An elapsed window is reset first and reopened with `interval`. A live
    /// window keeps the interval it was opened with.
    pub fn increment(&mut self, now: Instant, interval: Duration) -> u64 {
        if self.is_expired(now) {
            self.count = 0;
            self.window_start = now;
            self.interval = interval;
        }

        self.count += 1;
        self.count
    }

    /// Whether the window has fully elapsed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.interval
    }

    /// Get the current count.
    pub fn count(&self) -> u64 {
        self.count
    }
}
