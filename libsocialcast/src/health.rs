//! Account health tracking
//!
//! Every `(platform, account)` pair carries error counters, the last success
//! and the token expiry. Status is derived from those facts each time it is
//! read, so token-expiry proximity is always current:
//!
//! | condition                                        | status         |
//! |--------------------------------------------------|----------------|
//! | auth failure since last success, token expired   | `Disconnected` |
//! | `consecutive_errors >= error_after_errors`       | `Error`        |
//! | `consecutive_errors >= warning_after_errors`, token expiring soon | `Warning` |
//! | otherwise                                        | `Healthy`      |
//!
//! When several conditions hold, the most severe wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::{to_chrono, Clock, SystemClock};
use crate::config::HealthConfig;
use crate::keyed::{lock, AccountKey, KeyedCells};

/// Message stored as the last error after an authentication failure
pub const AUTH_FAILURE_MESSAGE: &str = "Authentication failed - reconnect required";

/// Coarse account reliability, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
    Disconnected,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
            HealthStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of one account's health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountHealthSnapshot {
    pub platform: String,
    pub account_id: String,
    pub status: HealthStatus,
    pub consecutive_errors: u32,
    pub total_api_calls: u64,
    pub total_errors: u64,
    pub total_publishes: u64,
    pub last_successful_call: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Hours until the token expires; negative once expired
    pub token_hours_left: Option<f64>,
}

#[derive(Debug, Default)]
struct HealthRecord {
    consecutive_errors: u32,
    total_api_calls: u64,
    total_errors: u64,
    total_publishes: u64,
    last_successful_call: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    token_expires_at: Option<DateTime<Utc>>,
    auth_failed: bool,
    /// Status as of the last mutation or read, used to log transitions
    last_status: Option<HealthStatus>,
}

impl HealthRecord {
    fn status(&self, now: DateTime<Utc>, config: &HealthConfig) -> HealthStatus {
        let mut status = HealthStatus::Healthy;

        if self.consecutive_errors >= config.warning_after_errors {
            status = status.max(HealthStatus::Warning);
        }
        if self.consecutive_errors >= config.error_after_errors {
            status = status.max(HealthStatus::Error);
        }
        if let Some(expires_at) = self.token_expires_at {
            if expires_at <= now {
                status = status.max(HealthStatus::Disconnected);
            } else if expires_at - now < to_chrono(config.token_warning_window) {
                status = status.max(HealthStatus::Warning);
            }
        }
        if self.auth_failed {
            status = HealthStatus::Disconnected;
        }

        status
    }

    fn snapshot(
        &self,
        key: &AccountKey,
        now: DateTime<Utc>,
        config: &HealthConfig,
    ) -> AccountHealthSnapshot {
        AccountHealthSnapshot {
            platform: key.platform.clone(),
            account_id: key.account_id.clone(),
            status: self.status(now, config),
            consecutive_errors: self.consecutive_errors,
            total_api_calls: self.total_api_calls,
            total_errors: self.total_errors,
            total_publishes: self.total_publishes,
            last_successful_call: self.last_successful_call,
            last_error: self.last_error.clone(),
            last_error_at: self.last_error_at,
            token_expires_at: self.token_expires_at,
            token_hours_left: self
                .token_expires_at
                .map(|at| (at - now).num_seconds() as f64 / 3600.0),
        }
    }
}

fn mark_success(record: &mut HealthRecord, now: DateTime<Utc>) {
    record.total_api_calls += 1;
    record.consecutive_errors = 0;
    record.auth_failed = false;
    record.last_successful_call = Some(now);
}

/// Tracks health for every account the process has talked to
pub struct AccountHealthTracker {
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    accounts: KeyedCells<HealthRecord>,
}

impl AccountHealthTracker {
    pub fn new(config: HealthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            accounts: KeyedCells::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HealthConfig::default(), Arc::new(SystemClock))
    }

    /// Apply `change` to the account's record and log any status transition
    fn update(
        &self,
        platform: &str,
        account_id: &str,
        change: impl FnOnce(&mut HealthRecord, DateTime<Utc>),
    ) {
        let key = AccountKey::new(platform, account_id);
        let cell = self.accounts.get_or_insert_with(&key, HealthRecord::default);
        let mut record = lock(&cell);
        let now = self.clock.now();

        change(&mut record, now);
        self.observe(&key, &mut record, now);
    }

    fn observe(
        &self,
        key: &AccountKey,
        record: &mut HealthRecord,
        now: DateTime<Utc>,
    ) -> HealthStatus {
        let status = record.status(now, &self.config);
        let previous = record.last_status.replace(status).unwrap_or(HealthStatus::Healthy);

        if status > previous {
            warn!(
                "Account {} health changed {} -> {}{}",
                key,
                previous,
                status,
                record
                    .last_error
                    .as_deref()
                    .map(|e| format!(": {}", e))
                    .unwrap_or_default()
            );
        } else if status < previous {
            info!("Account {} health recovered {} -> {}", key, previous, status);
        }

        status
    }

    /// A successful API call: clears the error streak and any auth failure
    ///
    /// An expired or soon-expiring token still downgrades the status.
    pub fn record_success(&self, platform: &str, account_id: &str) {
        self.update(platform, account_id, mark_success);
    }

    /// A confirmed publish; counts it and then behaves as [`Self::record_success`]
    pub fn record_publish(&self, platform: &str, account_id: &str) {
        self.update(platform, account_id, |record, now| {
            record.total_publishes += 1;
            mark_success(record, now);
        });
    }

    pub fn record_error(&self, platform: &str, account_id: &str, message: &str) {
        self.update(platform, account_id, |record, now| {
            record.consecutive_errors = record.consecutive_errors.saturating_add(1);
            record.total_api_calls += 1;
            record.total_errors += 1;
            record.last_error = Some(message.to_string());
            record.last_error_at = Some(now);
        });
    }

    /// Credentials were rejected; the account stays Disconnected until a success
    pub fn record_auth_failure(&self, platform: &str, account_id: &str) {
        self.update(platform, account_id, |record, now| {
            record.auth_failed = true;
            record.last_error = Some(AUTH_FAILURE_MESSAGE.to_string());
            record.last_error_at = Some(now);
        });
    }

    /// Store (or clear, with `None`) the access token expiry
    pub fn set_token_expiry(
        &self,
        platform: &str,
        account_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.update(platform, account_id, |record, _| {
            record.token_expires_at = expires_at;
        });
    }

    /// Current health; unseen accounts start out Healthy with zero counters
    pub fn get_health(&self, platform: &str, account_id: &str) -> AccountHealthSnapshot {
        let key = AccountKey::new(platform, account_id);
        let cell = self.accounts.get_or_insert_with(&key, HealthRecord::default);
        let mut record = lock(&cell);
        let now = self.clock.now();
        self.observe(&key, &mut record, now);
        record.snapshot(&key, now, &self.config)
    }

    pub fn get_all_health(&self) -> Vec<AccountHealthSnapshot> {
        let now = self.clock.now();
        self.accounts
            .entries()
            .into_iter()
            .map(|(key, cell)| {
                let mut record = lock(&cell);
                self.observe(&key, &mut record, now);
                record.snapshot(&key, now, &self.config)
            })
            .collect()
    }

    /// Accounts whose status is anything but Healthy
    pub fn get_accounts_needing_attention(&self) -> Vec<AccountHealthSnapshot> {
        self.get_all_health()
            .into_iter()
            .filter(|snapshot| snapshot.status != HealthStatus::Healthy)
            .collect()
    }

    /// Forget an account, e.g. after it has been disconnected by the user
    pub fn remove_account(&self, platform: &str, account_id: &str) -> bool {
        self.accounts.remove(&AccountKey::new(platform, account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::time::Duration;

    fn setup() -> (AccountHealthTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
        ));
        (
            AccountHealthTracker::new(HealthConfig::default(), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_new_account_is_healthy() {
        let (tracker, _) = setup();
        let health = tracker.get_health("twitter", "a");
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.consecutive_errors, 0);
        assert_eq!(health.total_publishes, 0);
        assert_eq!(health.total_api_calls, 0);
        assert!(health.last_successful_call.is_none());
    }

    #[test]
    fn test_error_thresholds() {
        let (tracker, _) = setup();

        tracker.record_error("twitter", "a", "500 server error");
        assert_eq!(tracker.get_health("twitter", "a").status, HealthStatus::Healthy);

        tracker.record_error("twitter", "a", "500 server error");
        assert_eq!(tracker.get_health("twitter", "a").status, HealthStatus::Warning);

        for _ in 0..3 {
            tracker.record_error("twitter", "a", "500 server error");
        }
        let health = tracker.get_health("twitter", "a");
        assert_eq!(health.status, HealthStatus::Error);
        assert_eq!(health.consecutive_errors, 5);
        assert_eq!(health.last_error.as_deref(), Some("500 server error"));
    }

    #[test]
    fn test_success_resets_errors() {
        let (tracker, clock) = setup();
        for _ in 0..5 {
            tracker.record_error("twitter", "a", "timeout");
        }
        tracker.record_success("twitter", "a");

        let health = tracker.get_health("twitter", "a");
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.consecutive_errors, 0);
        assert_eq!(health.total_errors, 5);
        assert_eq!(health.total_api_calls, 6);
        assert_eq!(health.last_successful_call, Some(clock.now()));
    }

    #[test]
    fn test_record_publish_counts_and_resets() {
        let (tracker, _) = setup();
        tracker.record_error("instagram", "a", "boom");
        tracker.record_error("instagram", "a", "boom");
        tracker.record_publish("instagram", "a");
        tracker.record_publish("instagram", "a");

        let health = tracker.get_health("instagram", "a");
        assert_eq!(health.total_publishes, 2);
        assert_eq!(health.total_api_calls, 4);
        assert_eq!(health.total_errors, 2);
        assert_eq!(health.consecutive_errors, 0);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_auth_failure_forces_disconnected() {
        let (tracker, _) = setup();
        tracker.record_auth_failure("facebook", "a");

        let health = tracker.get_health("facebook", "a");
        assert_eq!(health.status, HealthStatus::Disconnected);
        assert_eq!(health.consecutive_errors, 0);
        assert_eq!(health.last_error.as_deref(), Some(AUTH_FAILURE_MESSAGE));

        // Further generic errors do not improve it
        tracker.record_error("facebook", "a", "500");
        assert_eq!(tracker.get_health("facebook", "a").status, HealthStatus::Disconnected);
    }

    #[test]
    fn test_success_clears_auth_failure() {
        let (tracker, _) = setup();
        tracker.record_auth_failure("facebook", "a");
        tracker.record_success("facebook", "a");
        assert_eq!(tracker.get_health("facebook", "a").status, HealthStatus::Healthy);
    }

    #[test]
    fn test_token_expiring_soon_is_warning() {
        let (tracker, clock) = setup();
        let expires = clock.now() + chrono::Duration::hours(10);
        tracker.set_token_expiry("tiktok", "a", Some(expires));

        let health = tracker.get_health("tiktok", "a");
        assert_eq!(health.status, HealthStatus::Warning);
        assert_eq!(health.token_hours_left, Some(10.0));
    }

    #[test]
    fn test_token_expiry_is_recomputed_on_read() {
        let (tracker, clock) = setup();
        let expires = clock.now() + chrono::Duration::hours(48);
        tracker.set_token_expiry("tiktok", "a", Some(expires));
        assert_eq!(tracker.get_health("tiktok", "a").status, HealthStatus::Healthy);

        clock.advance(Duration::from_secs(30 * 3600));
        assert_eq!(tracker.get_health("tiktok", "a").status, HealthStatus::Warning);

        clock.advance(Duration::from_secs(20 * 3600));
        assert_eq!(tracker.get_health("tiktok", "a").status, HealthStatus::Disconnected);
    }

    #[test]
    fn test_success_does_not_clear_expired_token() {
        let (tracker, clock) = setup();
        tracker.set_token_expiry("tiktok", "a", Some(clock.now() - chrono::Duration::hours(1)));
        tracker.record_success("tiktok", "a");
        assert_eq!(tracker.get_health("tiktok", "a").status, HealthStatus::Disconnected);

        // A refreshed token restores the account
        tracker.set_token_expiry("tiktok", "a", Some(clock.now() + chrono::Duration::days(30)));
        assert_eq!(tracker.get_health("tiktok", "a").status, HealthStatus::Healthy);
    }

    #[test]
    fn test_token_expiry_does_not_improve_error_status() {
        let (tracker, clock) = setup();
        for _ in 0..5 {
            tracker.record_error("twitter", "a", "500");
        }
        tracker.set_token_expiry("twitter", "a", Some(clock.now() + chrono::Duration::hours(2)));
        assert_eq!(tracker.get_health("twitter", "a").status, HealthStatus::Error);
    }

    #[test]
    fn test_clearing_token_expiry() {
        let (tracker, clock) = setup();
        tracker.set_token_expiry("twitter", "a", Some(clock.now() + chrono::Duration::hours(2)));
        tracker.set_token_expiry("twitter", "a", None);

        let health = tracker.get_health("twitter", "a");
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.token_hours_left.is_none());
    }

    #[test]
    fn test_accounts_needing_attention() {
        let (tracker, _) = setup();
        tracker.record_success("twitter", "ok");
        tracker.record_auth_failure("twitter", "broken");
        tracker.record_error("instagram", "flaky", "500");
        tracker.record_error("instagram", "flaky", "500");

        let attention = tracker.get_accounts_needing_attention();
        let ids: Vec<_> = attention.iter().map(|h| h.account_id.as_str()).collect();
        assert_eq!(ids, vec!["flaky", "broken"]);
        assert_eq!(tracker.get_all_health().len(), 3);
    }

    #[test]
    fn test_remove_account() {
        let (tracker, _) = setup();
        tracker.record_auth_failure("twitter", "a");
        assert!(tracker.remove_account("twitter", "a"));
        assert!(tracker.get_accounts_needing_attention().is_empty());
        assert_eq!(tracker.get_health("twitter", "a").status, HealthStatus::Healthy);
    }

    #[test]
    fn test_status_ordering() {
        assert!(HealthStatus::Healthy < HealthStatus::Warning);
        assert!(HealthStatus::Warning < HealthStatus::Error);
        assert!(HealthStatus::Error < HealthStatus::Disconnected);
        assert_eq!(
            serde_json::to_string(&HealthStatus::Disconnected).unwrap(),
            "\"disconnected\""
        );
    }
}
