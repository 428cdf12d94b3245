//! Sliding 60-second request counters, per-endpoint and global (§4.1).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
pub struct SlidingWindowCounter {
    timestamps: VecDeque<Instant>,
}

impl SlidingWindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn evict_stale(&mut self, now: Instant) {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) > WINDOW {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Property test 10: called at a steady rate of exactly `limit` per
    /// 60s window, returns `true` exactly `limit` times in that window.
    pub fn can_make_request(&mut self, limit: u32, now: Instant) -> bool {
        self.evict_stale(now);
        (self.timestamps.len() as u32) < limit
    }

    pub fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    pub fn current_count(&mut self, now: Instant) -> u32 {
        self.evict_stale(now);
        self.timestamps.len() as u32
    }
}
