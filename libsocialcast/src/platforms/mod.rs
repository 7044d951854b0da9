//! Platform publisher abstraction
//!
//! A [`PlatformPublisher`] is bound to one connected account and knows how to
//! talk to that account's platform. The orchestrator never builds publishers
//! itself; it asks a [`PublisherFactory`] for the one matching each target
//! account.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libsocialcast::platforms::{mock::MockPublisher, PublisherFactory, PublisherRegistry};
//! use libsocialcast::types::SocialAccount;
//!
//! # fn example() -> libsocialcast::error::Result<()> {
//! let registry = PublisherRegistry::new()
//!     .with_platform("twitter", Arc::new(MockPublisher::success("twitter")));
//!
//! let account = SocialAccount::new("acc-1", "twitter", "token");
//! let publisher = registry.publisher_for(&account)?;
//! assert_eq!(publisher.name(), "twitter");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PlatformError, Result};
use crate::types::{PostType, SocialAccount};

// Available in all builds so integration tests and embedding hosts can use it
pub mod mock;

/// What gets sent to a platform for one account
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    /// Caption (or per-account override) with hashtags appended
    pub text: String,
    pub media_paths: Vec<String>,
    pub post_type: PostType,
}

/// Structured answer from a platform publish call
///
/// A platform that reached the API but was refused reports `success: false`
/// with an `error_message`. Transport-level failures are returned as `Err`
/// from [`PlatformPublisher::publish`] instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformPostResult {
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub platform_media_ids: Vec<String>,
    pub error_message: Option<String>,
    /// Explicit retry-after hint sent with a throttling response
    pub retry_after: Option<Duration>,
}

impl PlatformPostResult {
    pub fn published(platform_post_id: impl Into<String>) -> Self {
        Self {
            success: true,
            platform_post_id: Some(platform_post_id.into()),
            ..Default::default()
        }
    }

    pub fn with_media_ids(mut self, media_ids: Vec<String>) -> Self {
        self.platform_media_ids = media_ids;
        self
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error_message.into()),
            ..Default::default()
        }
    }

    pub fn throttled(error_message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::failed(error_message)
        }
    }
}

/// Engagement numbers for one published post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub impressions: u64,
    pub reach: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub saves: u64,
    pub clicks: u64,
    pub engagement_rate: f64,
}

/// Account-level audience numbers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub followers_count: u64,
    pub impressions: u64,
    pub reach: u64,
    pub engagement_rate: f64,
}

/// Credentials returned by a token refresh
#[derive(Debug)]
pub struct OAuthTokens {
    pub access_token: SecretString,
    /// Present when the platform rotates refresh tokens
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<Duration>,
    pub scopes: Vec<String>,
}

/// Capabilities of one platform integration, bound to one account
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Platform identifier (e.g. "twitter", "instagram")
    fn name(&self) -> &str;

    /// Publish text and media to the account
    ///
    /// # Errors
    ///
    /// Returns an error when the call could not be completed at all (network
    /// failure, unexpected response). Refusals by the platform are reported
    /// through [`PlatformPostResult::failed`].
    async fn publish(&self, request: &PublishRequest) -> Result<PlatformPostResult>;

    async fn delete_post(&self, platform_post_id: &str) -> Result<bool> {
        Err(PlatformError::NotImplemented(format!(
            "{} does not support deleting post {}",
            self.name(),
            platform_post_id
        ))
        .into())
    }

    async fn get_post_metrics(&self, platform_post_id: &str) -> Result<PostMetrics> {
        Err(PlatformError::NotImplemented(format!(
            "{} does not report metrics for post {}",
            self.name(),
            platform_post_id
        ))
        .into())
    }

    async fn get_account_metrics(&self) -> Result<AccountMetrics> {
        Err(PlatformError::NotImplemented(format!(
            "{} does not report account metrics",
            self.name()
        ))
        .into())
    }

    /// Exchange a refresh token for a new access token
    async fn refresh_access_token(&self, _refresh_token: &SecretString) -> Result<OAuthTokens> {
        Err(PlatformError::NotImplemented(format!(
            "{} does not support token refresh",
            self.name()
        ))
        .into())
    }
}

/// Resolves the publisher for an account
pub trait PublisherFactory: Send + Sync {
    fn publisher_for(&self, account: &SocialAccount) -> Result<Arc<dyn PlatformPublisher>>;
}

/// Static publisher table: per-account entries first, then per-platform
#[derive(Default, Clone)]
pub struct PublisherRegistry {
    by_account: HashMap<String, Arc<dyn PlatformPublisher>>,
    by_platform: HashMap<String, Arc<dyn PlatformPublisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_platform(&mut self, platform: &str, publisher: Arc<dyn PlatformPublisher>) {
        self.by_platform.insert(platform.to_string(), publisher);
    }

    pub fn register_account(&mut self, account_id: &str, publisher: Arc<dyn PlatformPublisher>) {
        self.by_account.insert(account_id.to_string(), publisher);
    }

    pub fn with_platform(mut self, platform: &str, publisher: Arc<dyn PlatformPublisher>) -> Self {
        self.register_platform(platform, publisher);
        self
    }

    pub fn with_account(mut self, account_id: &str, publisher: Arc<dyn PlatformPublisher>) -> Self {
        self.register_account(account_id, publisher);
        self
    }
}

impl PublisherFactory for PublisherRegistry {
    fn publisher_for(&self, account: &SocialAccount) -> Result<Arc<dyn PlatformPublisher>> {
        self.by_account
            .get(&account.id)
            .or_else(|| self.by_platform.get(&account.platform))
            .cloned()
            .ok_or_else(|| {
                PlatformError::UnsupportedPlatform(format!(
                    "Unsupported platform: {}",
                    account.platform
                ))
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockPublisher;
    use super::*;

    #[test]
    fn test_registry_prefers_account_entry() {
        let registry = PublisherRegistry::new()
            .with_platform("twitter", Arc::new(MockPublisher::success("twitter")))
            .with_account("special", Arc::new(MockPublisher::success("twitter-special")));

        let special = SocialAccount::new("special", "twitter", "t");
        let regular = SocialAccount::new("regular", "twitter", "t");

        assert_eq!(registry.publisher_for(&special).unwrap().name(), "twitter-special");
        assert_eq!(registry.publisher_for(&regular).unwrap().name(), "twitter");
    }

    #[test]
    fn test_registry_unknown_platform() {
        let registry = PublisherRegistry::new();
        let account = SocialAccount::new("a", "myspace", "t");

        let err = registry.publisher_for(&account).err().unwrap();
        assert!(err.to_string().contains("Unsupported platform: myspace"));
    }

    #[test]
    fn test_result_constructors() {
        let ok = PlatformPostResult::published("tw-1").with_media_ids(vec!["m1".to_string()]);
        assert!(ok.success);
        assert_eq!(ok.platform_post_id.as_deref(), Some("tw-1"));
        assert_eq!(ok.platform_media_ids, vec!["m1"]);

        let throttled =
            PlatformPostResult::throttled("429 Too Many Requests", Some(Duration::from_secs(60)));
        assert!(!throttled.success);
        assert_eq!(throttled.retry_after, Some(Duration::from_secs(60)));
        assert_eq!(throttled.error_message.as_deref(), Some("429 Too Many Requests"));
    }

    #[tokio::test]
    async fn test_default_capabilities_not_implemented() {
        let publisher = MockPublisher::success("tiktok");
        let err = publisher.delete_post("x").await.unwrap_err();
        assert!(err.to_string().contains("Not implemented"));

        let err = publisher.get_account_metrics().await.unwrap_err();
        assert!(err.to_string().contains("account metrics"));
    }
}
