//! Per-day publish quota

use chrono::{DateTime, NaiveDate, Utc};

/// Counts publishes per UTC calendar day
///
/// The count resets the first time it is touched on a new day.
#[derive(Debug, Clone)]
pub struct DailyQuota {
    max_per_day: u32,
    count: u32,
    day: Option<NaiveDate>,
}

impl DailyQuota {
    pub fn new(max_per_day: u32) -> Self {
        Self {
            max_per_day,
            count: 0,
            day: None,
        }
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.count = 0;
            self.day = Some(today);
        }
    }

    fn count_on(&self, now: DateTime<Utc>) -> u32 {
        if self.day == Some(now.date_naive()) {
            self.count
        } else {
            0
        }
    }

    pub fn can_publish(&mut self, now: DateTime<Utc>) -> bool {
        self.roll_over(now);
        self.count < self.max_per_day
    }

    pub fn record_publish(&mut self, now: DateTime<Utc>) {
        self.roll_over(now);
        self.count = self.count.saturating_add(1);
    }

    /// Publishes left today, floored at zero (read-only)
    pub fn remaining(&self, now: DateTime<Utc>) -> u32 {
        self.max_per_day.saturating_sub(self.count_on(now))
    }
}
