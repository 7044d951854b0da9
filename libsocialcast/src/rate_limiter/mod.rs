//! Per-account API rate limiting
//!
//! [`RateLimiter`] combines three independent trackers for every
//! `(platform, account)` pair:
//!
//! - a [`SlidingWindow`] bounding API calls per rolling window,
//! - a [`DailyQuota`] bounding publishes per UTC day,
//! - a [`Backoff`] deadline set after the platform signals throttling.
//!
//! Budgets are fixed per platform at construction time. Each account's
//! trackers live behind their own lock, so accounts never contend.
//!
//! # Examples
//!
//! ```no_run
//! use libsocialcast::rate_limiter::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::with_defaults();
//! if limiter.can_publish("twitter", "acc-1") {
//!     limiter.acquire("twitter", "acc-1").await;
//!     // ... call the platform ...
//!     limiter.record_publish("twitter", "acc-1");
//! }
//! # }
//! ```

pub mod backoff;
pub mod daily;
pub mod window;

pub use backoff::{Backoff, MAX_BACKOFF};
pub use daily::DailyQuota;
pub use window::SlidingWindow;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::keyed::{lock, AccountKey, KeyedCells};

/// Padding added to computed waits so the slot has really opened on wake-up
const POLL_SLACK: Duration = Duration::from_millis(250);

/// Longest single sleep inside `acquire` before re-checking
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Platform used when a platform has no budget of its own
pub const FALLBACK_PLATFORM: &str = "twitter";

/// Rate limit configuration for one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateBudget {
    /// API calls allowed per window
    pub max_requests: u32,
    /// Length of the sliding window
    #[serde(with = "crate::config::duration_str")]
    pub window: Duration,
    /// Publishes allowed per UTC day
    pub max_publishes_per_day: u32,
    /// Growth factor applied on repeated throttling
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    /// Retry allowance for callers that re-run failed publishes
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

impl RateBudget {
    pub fn new(max_requests: u32, window: Duration, max_publishes_per_day: u32) -> Self {
        Self {
            max_requests,
            window,
            max_publishes_per_day,
            backoff_base: default_backoff_base(),
            max_retries: default_max_retries(),
        }
    }

    /// Built-in budget for a known platform
    pub fn builtin(platform: &str) -> Option<Self> {
        let budget = match platform {
            // 300 requests per 15 minutes; conservative daily cap for the free tier
            "twitter" => Self::new(300, Duration::from_secs(900), 50),
            // 200 calls/hour per user token; 25 posts per 24h
            "instagram" => Self::new(200, Duration::from_secs(3600), 25),
            "facebook" => Self::new(200, Duration::from_secs(3600), 50),
            "tiktok" => Self::new(100, Duration::from_secs(3600), 10),
            _ => return None,
        };
        Some(budget)
    }
}

/// Budget table: configured overrides first, then built-ins, then the fallback platform
#[derive(Debug, Clone, Default)]
pub struct RateBudgets {
    overrides: HashMap<String, RateBudget>,
}

impl RateBudgets {
    pub fn new(overrides: HashMap<String, RateBudget>) -> Self {
        Self { overrides }
    }

    pub fn budget_for(&self, platform: &str) -> RateBudget {
        if let Some(budget) = self.overrides.get(platform) {
            return budget.clone();
        }
        RateBudget::builtin(platform)
            .or_else(|| self.overrides.get(FALLBACK_PLATFORM).cloned())
            .or_else(|| RateBudget::builtin(FALLBACK_PLATFORM))
            .unwrap_or_else(|| RateBudget::new(300, Duration::from_secs(900), 50))
    }
}

/// Read-only view of one account's limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub platform: String,
    pub account_id: String,
    pub api_calls_used: u32,
    pub api_calls_remaining: u32,
    pub publishes_remaining_today: u32,
    pub is_backing_off: bool,
    pub backoff_seconds_left: f64,
}

#[derive(Debug)]
struct AccountLimits {
    window: SlidingWindow,
    daily: DailyQuota,
    backoff: Backoff,
}

impl AccountLimits {
    fn from_budget(budget: &RateBudget) -> Self {
        Self {
            window: SlidingWindow::new(budget.max_requests, budget.window),
            daily: DailyQuota::new(budget.max_publishes_per_day),
            backoff: Backoff::new(budget.backoff_base),
        }
    }
}

/// Central rate limiter keyed by `(platform, account_id)`
pub struct RateLimiter {
    budgets: RateBudgets,
    clock: Arc<dyn Clock>,
    accounts: KeyedCells<AccountLimits>,
}

impl RateLimiter {
    pub fn new(budgets: RateBudgets, clock: Arc<dyn Clock>) -> Self {
        Self {
            budgets,
            clock,
            accounts: KeyedCells::new(),
        }
    }

    /// Built-in budgets on the system clock
    pub fn with_defaults() -> Self {
        Self::new(RateBudgets::default(), Arc::new(SystemClock))
    }

    pub fn budget_for(&self, platform: &str) -> RateBudget {
        self.budgets.budget_for(platform)
    }

    fn limits(&self, key: &AccountKey) -> Arc<std::sync::Mutex<AccountLimits>> {
        self.accounts.get_or_insert_with(key, || {
            AccountLimits::from_budget(&self.budgets.budget_for(&key.platform))
        })
    }

    /// Take a window slot if one is free and no backoff is active
    ///
    /// Returns how long to wait otherwise. Check and record happen under the
    /// account's lock, so overlapping callers cannot both take the last slot.
    fn try_take_slot(&self, key: &AccountKey) -> Option<Duration> {
        let cell = self.limits(key);
        let mut limits = lock(&cell);
        let now = self.clock.now();

        if limits.backoff.is_backing_off(now) {
            return Some(limits.backoff.remaining(now));
        }
        if limits.window.can_proceed(now) {
            limits.window.record(now);
            return None;
        }
        Some(limits.window.time_until_available(now))
    }

    /// Wait until a call is allowed, then consume one window slot
    ///
    /// Never fails; callers that need a bound wrap this in a timeout.
    pub async fn acquire(&self, platform: &str, account_id: &str) {
        let key = AccountKey::new(platform, account_id);
        while let Some(wait) = self.try_take_slot(&key) {
            let nap = (wait + POLL_SLACK).min(MAX_POLL_INTERVAL);
            debug!("Rate limited on {}, sleeping {:?}", key, nap);
            self.clock.sleep(nap).await;
        }
    }

    /// Whether today's publish quota has room (does not consume)
    pub fn can_publish(&self, platform: &str, account_id: &str) -> bool {
        let cell = self.limits(&AccountKey::new(platform, account_id));
        let mut limits = lock(&cell);
        limits.daily.can_publish(self.clock.now())
    }

    /// Count a confirmed publish against today's quota
    pub fn record_publish(&self, platform: &str, account_id: &str) {
        let cell = self.limits(&AccountKey::new(platform, account_id));
        let mut limits = lock(&cell);
        limits.daily.record_publish(self.clock.now());
    }

    /// Register a 429 from the platform
    pub fn record_rate_limit_hit(
        &self,
        platform: &str,
        account_id: &str,
        retry_after: Option<Duration>,
    ) {
        let key = AccountKey::new(platform, account_id);
        let cell = self.limits(&key);
        let mut limits = lock(&cell);
        let now = self.clock.now();
        limits.backoff.record_throttle(now, retry_after);
        warn!(
            "Throttled by {}; backing off for {:?}",
            key,
            limits.backoff.remaining(now)
        );
    }

    /// Diagnostic snapshot; never creates or mutates state
    pub fn get_status(&self, platform: &str, account_id: &str) -> RateLimitStatus {
        let key = AccountKey::new(platform, account_id);
        match self.accounts.get(&key) {
            Some(cell) => self.snapshot(&key, &lock(&cell)),
            None => {
                let fresh = AccountLimits::from_budget(&self.budgets.budget_for(platform));
                self.snapshot(&key, &fresh)
            }
        }
    }

    /// Snapshots for every account seen so far
    pub fn get_all_statuses(&self) -> Vec<RateLimitStatus> {
        self.accounts
            .entries()
            .into_iter()
            .map(|(key, cell)| self.snapshot(&key, &lock(&cell)))
            .collect()
    }

    fn snapshot(&self, key: &AccountKey, limits: &AccountLimits) -> RateLimitStatus {
        let now = self.clock.now();
        RateLimitStatus {
            platform: key.platform.clone(),
            account_id: key.account_id.clone(),
            api_calls_used: limits.window.current_count(now),
            api_calls_remaining: limits.window.remaining(now),
            publishes_remaining_today: limits.daily.remaining(now),
            is_backing_off: limits.backoff.is_backing_off(now),
            backoff_seconds_left: limits.backoff.remaining(now).as_secs_f64(),
        }
    }
}
