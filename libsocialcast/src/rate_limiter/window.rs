//! Sliding-window call counter

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

use crate::clock::{add_saturating, duration_between, sub_saturating};

/// Tracks API calls within a rolling time window
///
/// Timestamps older than the window are purged lazily whenever the window is
/// checked. `record` does not check capacity itself; callers pair it with a
/// successful `can_proceed` under the same lock.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    max_requests: u32,
    window: Duration,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            timestamps: VecDeque::new(),
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        sub_saturating(now, self.window)
    }

    fn purge(&mut self, now: DateTime<Utc>) {
        let cutoff = self.cutoff(now);
        while self.timestamps.front().is_some_and(|ts| *ts <= cutoff) {
            self.timestamps.pop_front();
        }
    }

    /// Whether another call fits in the window
    pub fn can_proceed(&mut self, now: DateTime<Utc>) -> bool {
        self.purge(now);
        (self.timestamps.len() as u64) < u64::from(self.max_requests)
    }

    /// Record a call at `now`
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.timestamps.push_back(now);
    }

    /// Time until the next slot opens; zero if one is free
    pub fn time_until_available(&mut self, now: DateTime<Utc>) -> Duration {
        if self.can_proceed(now) {
            return Duration::ZERO;
        }
        match self.timestamps.front() {
            Some(oldest) => duration_between(now, add_saturating(*oldest, self.window)),
            None => Duration::ZERO,
        }
    }

    /// Calls inside the window at `now`, without purging
    pub fn current_count(&self, now: DateTime<Utc>) -> u32 {
        let cutoff = self.cutoff(now);
        self.timestamps.iter().filter(|ts| **ts > cutoff).count() as u32
    }

    /// Free slots at `now`, without purging
    pub fn remaining(&self, now: DateTime<Utc>) -> u32 {
        self.max_requests.saturating_sub(self.current_count(now))
    }
}
