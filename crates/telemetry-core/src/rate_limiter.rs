//! Rate limiting for best-effort outputs.
//!
//! Denied calls are counted, never queued: the caller simply drops the work.

use std::time::{Duration, Instant};

/// Minimum-interval rate limiter. A rate of 0 disables limiting.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_rate_hz: u32,
    min_interval: Duration,
    last_processed: Option<Instant>,
    dropped_count: u64,
}

impl RateLimiter {
    /// Create a new rate limiter with maximum rate in Hz.
    pub fn new(max_rate_hz: u32) -> Self {
        Self {
            max_rate_hz,
            min_interval: interval_for(max_rate_hz),
            last_processed: None,
            dropped_count: 0,
        }
    }

    /// Returns true if processing should proceed now.
    pub fn should_process(&mut self) -> bool {
        self.should_process_at(Instant::now())
    }

    /// Returns true if processing should proceed at `now`.
    pub fn should_process_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_processed {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                self.dropped_count = self.dropped_count.saturating_add(1);
                return false;
            }
        }

        self.last_processed = Some(now);
        true
    }

    /// Number of calls denied.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    pub fn max_rate_hz(&self) -> u32 {
        self.max_rate_hz
    }
}

fn interval_for(max_rate_hz: u32) -> Duration {
    if max_rate_hz == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(1_000_000_000 / u64::from(max_rate_hz))
    }
}
