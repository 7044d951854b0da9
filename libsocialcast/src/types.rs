//! Core types for Socialcast

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub post_type: PostType,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn new(caption: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            caption,
            hashtags: Vec::new(),
            post_type: PostType::Feed,
            status: PostStatus::Draft,
            created_at: Utc::now(),
            scheduled_at: None,
        }
    }

    pub fn with_hashtags<I, S>(mut self, hashtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hashtags = hashtags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_post_type(mut self, post_type: PostType) -> Self {
        self.post_type = post_type;
        self
    }

    /// Text sent to a platform: caption (or override), then hashtags
    ///
    /// Hashtags are appended after a blank line as `#tag` separated by spaces.
    pub fn render_text(&self, caption_override: Option<&str>) -> String {
        let caption = caption_override.unwrap_or(&self.caption);
        if self.hashtags.is_empty() {
            return caption.to_string();
        }
        let tags = self
            .hashtags
            .iter()
            .map(|tag| format!("#{}", tag))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{}\n\n{}", caption, tags)
    }
}

/// Lifecycle of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    /// Reduce per-account outcomes to one post status
    ///
    /// All published → Published; all failed → Failed; a mix is reported as
    /// Published. Callers that care about partial success read the individual
    /// outcomes.
    ///
    /// An empty list is Failed rather than vacuously Published: a post that
    /// reached no account was not published anywhere.
    pub fn aggregate(outcomes: &[AccountOutcome]) -> Self {
        if outcomes.iter().any(|o| o.status == AttemptStatus::Published) {
            PostStatus::Published
        } else {
            PostStatus::Failed
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("Unknown post status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Feed,
    Reel,
    Story,
    Carousel,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Feed => "feed",
            PostType::Reel => "reel",
            PostType::Story => "story",
            PostType::Carousel => "carousel",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed" => Ok(PostType::Feed),
            "reel" => Ok(PostType::Reel),
            "story" => Ok(PostType::Story),
            "carousel" => Ok(PostType::Carousel),
            other => Err(format!("Unknown post type: {}", other)),
        }
    }
}

/// A user's connected identity on one platform
#[derive(Debug)]
pub struct SocialAccount {
    pub id: String,
    pub platform: String,
    pub platform_user_id: String,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl SocialAccount {
    pub fn new(id: &str, platform: &str, access_token: &str) -> Self {
        Self {
            id: id.to_string(),
            platform: platform.to_string(),
            platform_user_id: id.to_string(),
            access_token: SecretString::from(access_token.to_string()),
            refresh_token: None,
            token_expires_at: None,
            is_active: true,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: &str) -> Self {
        self.refresh_token = Some(SecretString::from(refresh_token.to_string()));
        self
    }

    pub fn with_token_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.token_expires_at = Some(expires_at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A media file attached to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub file_path: String,
}

impl MediaRef {
    pub fn new(id: &str, file_path: &str) -> Self {
        Self {
            id: id.to_string(),
            file_path: file_path.to_string(),
        }
    }
}

/// State of one account-scoped publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Published,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Published => "published",
            AttemptStatus::Failed => "failed",
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptStatus::Pending),
            "published" => Ok(AttemptStatus::Published),
            "failed" => Ok(AttemptStatus::Failed),
            other => Err(format!("Unknown attempt status: {}", other)),
        }
    }
}

/// Settled result of publishing to one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountOutcome {
    pub account_id: String,
    pub platform: String,
    pub status: AttemptStatus,
    pub platform_post_id: Option<String>,
    pub platform_media_ids: Vec<String>,
    pub error: Option<String>,
    /// Caption override used for this account, if any
    pub caption_override: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl AccountOutcome {
    pub fn published(
        account_id: &str,
        platform: &str,
        platform_post_id: Option<String>,
        platform_media_ids: Vec<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            platform: platform.to_string(),
            status: AttemptStatus::Published,
            platform_post_id,
            platform_media_ids,
            error: None,
            caption_override: None,
            attempted_at: at,
        }
    }

    pub fn failed(account_id: &str, platform: &str, error: String, at: DateTime<Utc>) -> Self {
        Self {
            account_id: account_id.to_string(),
            platform: platform.to_string(),
            status: AttemptStatus::Failed,
            platform_post_id: None,
            platform_media_ids: Vec::new(),
            error: Some(error),
            caption_override: None,
            attempted_at: at,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == AttemptStatus::Published
    }
}

/// Persisted per-account row for a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPlatformRecord {
    pub post_id: String,
    pub social_account_id: String,
    pub platform: String,
    pub platform_post_id: Option<String>,
    pub platform_media_ids: Vec<String>,
    pub status: AttemptStatus,
    pub error_message: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub platform_specific_caption: Option<String>,
}

/// Everything a caller learns from one publish run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub post_id: String,
    pub outcomes: Vec<AccountOutcome>,
    pub aggregate_status: PostStatus,
}

impl PublishReport {
    pub fn published_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_published()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == AttemptStatus::Failed)
            .count()
    }

    /// Some targets succeeded and some failed
    pub fn is_partial(&self) -> bool {
        self.published_count() > 0 && self.failed_count() > 0
    }

    pub fn outcome_for(&self, account_id: &str) -> Option<&AccountOutcome> {
        self.outcomes.iter().find(|o| o.account_id == account_id)
    }
}
