//! Exponential backoff after throttling signals

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::clock::{add_saturating, duration_between};

/// Upper bound for a computed backoff delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Shortest delay used as the growth seed
const MIN_BACKOFF_SEED: Duration = Duration::from_secs(1);

/// "Do not call before" deadline for one account
///
/// There is no reset: once throttling stops, the deadline simply lapses.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: f64,
    available_at: Option<DateTime<Utc>>,
}

impl Backoff {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            available_at: None,
        }
    }

    /// Register a throttling signal
    ///
    /// An explicit `retry_after` wins. Otherwise the delay is
    /// `max(1s, remaining) * base`, capped at [`MAX_BACKOFF`].
    pub fn record_throttle(&mut self, now: DateTime<Utc>, retry_after: Option<Duration>) {
        let delay = match retry_after {
            Some(retry_after) => retry_after,
            None => {
                let seed = self.remaining(now).max(MIN_BACKOFF_SEED);
                Duration::try_from_secs_f64(seed.as_secs_f64() * self.base)
                    .unwrap_or(MAX_BACKOFF)
                    .min(MAX_BACKOFF)
            }
        };
        self.available_at = Some(add_saturating(now, delay));
    }

    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.available_at.is_some_and(|at| now < at)
    }

    /// Time left until calls are allowed again
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.available_at
            .map(|at| duration_between(now, at))
            .unwrap_or(Duration::ZERO)
    }

    pub fn available_at(&self) -> Option<DateTime<Utc>> {
        self.available_at
    }
}
