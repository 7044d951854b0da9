//! Mock publisher for testing
//!
//! Simulates platform successes, refusals, throttling, transport errors,
//! panics and latency without credentials or network access. Call counters
//! are shared through `Arc`, so clones of a [`MockConfig`] observe the same
//! counts.

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::keyed::lock;
use crate::platforms::{
    OAuthTokens, PlatformPostResult, PlatformPublisher, PostMetrics, PublishRequest,
};

/// How the mock answers `publish`
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Report success with a generated post id
    Succeed,
    /// Report a structured failure with this message
    Fail(String),
    /// Report a throttling failure, optionally with a retry-after hint
    Throttle {
        message: String,
        retry_after: Option<Duration>,
    },
    /// Return this error instead of a result
    Error(PlatformError),
    /// Panic inside the publish call
    Panic,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,
    pub behavior: MockBehavior,
    /// Simulated network latency
    pub delay: Duration,
    /// Lifetime reported by a successful token refresh
    pub refresh_expires_in: Option<Duration>,
    /// When set, token refresh fails with this message
    pub refresh_error: Option<String>,
    pub publish_call_count: Arc<Mutex<usize>>,
    pub refresh_call_count: Arc<Mutex<usize>>,
    /// Texts received by `publish`, in call order
    pub published_texts: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            behavior: MockBehavior::Succeed,
            delay: Duration::ZERO,
            refresh_expires_in: Some(Duration::from_secs(60 * 24 * 3600)),
            refresh_error: None,
            publish_call_count: Arc::new(Mutex::new(0)),
            refresh_call_count: Arc::new(Mutex::new(0)),
            published_texts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    fn with_behavior(name: &str, behavior: MockBehavior) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            behavior,
            ..Default::default()
        })
    }

    pub fn success(name: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Succeed)
    }

    /// Platform refuses every publish with `message`
    pub fn failure(name: &str, message: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Fail(message.to_string()))
    }

    pub fn throttled(name: &str, retry_after: Option<Duration>) -> Self {
        Self::with_behavior(
            name,
            MockBehavior::Throttle {
                message: "429 Too Many Requests".to_string(),
                retry_after,
            },
        )
    }

    /// `publish` returns `Err(error)`
    pub fn erroring(name: &str, error: PlatformError) -> Self {
        Self::with_behavior(name, MockBehavior::Error(error))
    }

    pub fn panicking(name: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Panic)
    }

    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Token refresh fails with `message`; publishing succeeds
    pub fn refresh_failure(name: &str, message: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            refresh_error: Some(message.to_string()),
            ..Default::default()
        })
    }

    pub fn publish_call_count(&self) -> usize {
        *lock(&self.config.publish_call_count)
    }

    pub fn refresh_call_count(&self) -> usize {
        *lock(&self.config.refresh_call_count)
    }

    pub fn published_texts(&self) -> Vec<String> {
        lock(&self.config.published_texts).clone()
    }
}

#[async_trait]
impl PlatformPublisher for MockPublisher {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn publish(&self, request: &PublishRequest) -> Result<PlatformPostResult> {
        *lock(&self.config.publish_call_count) += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        match &self.config.behavior {
            MockBehavior::Succeed => {
                lock(&self.config.published_texts).push(request.text.clone());
                let post_id = format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4());
                let media_ids = (0..request.media_paths.len())
                    .map(|i| format!("{}:media-{}", self.config.name, i))
                    .collect();
                Ok(PlatformPostResult::published(post_id).with_media_ids(media_ids))
            }
            MockBehavior::Fail(message) => Ok(PlatformPostResult::failed(message.clone())),
            MockBehavior::Throttle {
                message,
                retry_after,
            } => Ok(PlatformPostResult::throttled(message.clone(), *retry_after)),
            MockBehavior::Error(error) => Err(error.clone().into()),
            MockBehavior::Panic => panic!("mock publisher {} panicked", self.config.name),
        }
    }

    async fn get_post_metrics(&self, _platform_post_id: &str) -> Result<PostMetrics> {
        Ok(PostMetrics::default())
    }

    async fn refresh_access_token(&self, _refresh_token: &SecretString) -> Result<OAuthTokens> {
        *lock(&self.config.refresh_call_count) += 1;

        if let Some(message) = &self.config.refresh_error {
            return Err(PlatformError::Authentication(message.clone()).into());
        }

        Ok(OAuthTokens {
            access_token: SecretString::from(format!(
                "{}-access-{}",
                self.config.name,
                uuid::Uuid::new_v4()
            )),
            refresh_token: None,
            expires_in: self.config.refresh_expires_in,
            scopes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostType;
    use secrecy::ExposeSecret;

    fn request(text: &str) -> PublishRequest {
        PublishRequest {
            text: text.to_string(),
            media_paths: vec!["/tmp/a.jpg".to_string()],
            post_type: PostType::Feed,
        }
    }

    #[tokio::test]
    async fn test_mock_success() {
        let publisher = MockPublisher::success("twitter");
        let result = publisher.publish(&request("Hello")).await.unwrap();

        assert!(result.success);
        assert!(result.platform_post_id.unwrap().starts_with("twitter:mock-"));
        assert_eq!(result.platform_media_ids, vec!["twitter:media-0"]);
        assert_eq!(publisher.publish_call_count(), 1);
        assert_eq!(publisher.published_texts(), vec!["Hello"]);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let publisher = MockPublisher::failure("twitter", "500 server error");
        let result = publisher.publish(&request("Hello")).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("500 server error"));
        assert!(publisher.published_texts().is_empty());
    }

    #[tokio::test]
    async fn test_mock_error() {
        let publisher = MockPublisher::erroring(
            "twitter",
            PlatformError::Network("connection reset".to_string()),
        );
        let err = publisher.publish(&request("Hello")).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let publisher = MockPublisher::with_delay("twitter", Duration::from_millis(30));
        let start = std::time::Instant::now();
        publisher.publish(&request("Hello")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_mock_refresh() {
        let publisher = MockPublisher::success("tiktok");
        let tokens = publisher
            .refresh_access_token(&SecretString::from("r".to_string()))
            .await
            .unwrap();
        assert!(tokens.access_token.expose_secret().starts_with("tiktok-access-"));
        assert_eq!(publisher.refresh_call_count(), 1);

        let failing = MockPublisher::refresh_failure("tiktok", "invalid_grant");
        let err = failing
            .refresh_access_token(&SecretString::from("r".to_string()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }
}
