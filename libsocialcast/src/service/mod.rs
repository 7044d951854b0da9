//! Service layer
//!
//! [`SocialcastService`] wires one database, rate limiter, health tracker,
//! event bus, orchestrator and token refresher together. Hosts build one per
//! process (or per test) and share it; nothing here is global.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use libsocialcast::platforms::{mock::MockPublisher, PublisherRegistry};
//! use libsocialcast::service::SocialcastService;
//! use libsocialcast::types::{Post, SocialAccount};
//! use libsocialcast::Config;
//!
//! # async fn example() -> libsocialcast::Result<()> {
//! let registry = PublisherRegistry::new()
//!     .with_platform("twitter", Arc::new(MockPublisher::success("twitter")));
//! let service = SocialcastService::from_config(Config::load()?, Arc::new(registry)).await?;
//!
//! let post = Post::new("Hello".to_string());
//! service.database().create_post(&post).await?;
//!
//! let accounts = vec![SocialAccount::new("acc-1", "twitter", "token")];
//! let report = service.publish(&post.id, &accounts, &[], &HashMap::new()).await?;
//! println!("{}: {} published", report.aggregate_status, report.published_count());
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod tokens;

use std::collections::HashMap;
use std::sync::Arc;

use self::events::{EventBus, EventReceiver};
use self::tokens::{TokenRefresh, TokenRefresher};
use crate::clock::{Clock, SystemClock};
use crate::health::{AccountHealthSnapshot, AccountHealthTracker};
use crate::orchestrator::PublishOrchestrator;
use crate::platforms::PublisherFactory;
use crate::rate_limiter::{RateLimitStatus, RateLimiter};
use crate::types::{MediaRef, PublishReport, SocialAccount};
use crate::{Config, Database, Result, SocialcastError};

pub struct SocialcastService {
    db: Arc<Database>,
    orchestrator: PublishOrchestrator,
    tokens: TokenRefresher,
    event_bus: EventBus,
}

impl SocialcastService {
    /// Build from the configuration file in the default location
    pub async fn new(publishers: Arc<dyn PublisherFactory>) -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config, publishers).await
    }

    pub async fn from_config(
        config: Config,
        publishers: Arc<dyn PublisherFactory>,
    ) -> Result<Self> {
        Self::from_config_with_clock(config, publishers, Arc::new(SystemClock)).await
    }

    /// Build with an explicit time source
    pub async fn from_config_with_clock(
        config: Config,
        publishers: Arc<dyn PublisherFactory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.database.path).await?);
        let event_bus = EventBus::new(config.publishing.event_capacity);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_budgets(), Arc::clone(&clock)));
        let health = Arc::new(AccountHealthTracker::new(
            config.health.clone(),
            Arc::clone(&clock),
        ));

        let orchestrator = PublishOrchestrator::new(
            Arc::clone(&db) as Arc<dyn crate::db::PublishStore>,
            Arc::clone(&publishers),
            rate_limiter,
            Arc::clone(&health),
            Arc::clone(&clock),
        )
        .with_events(event_bus.clone())
        .with_acquire_timeout(config.publishing.acquire_timeout);

        let tokens = TokenRefresher::new(publishers, health, clock, config.tokens.refresh_window);

        Ok(Self {
            db,
            orchestrator,
            tokens,
            event_bus,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn orchestrator(&self) -> &PublishOrchestrator {
        &self.orchestrator
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.orchestrator.rate_limiter()
    }

    pub fn health(&self) -> &AccountHealthTracker {
        self.orchestrator.health()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Load a stored post and publish it to `accounts`
    ///
    /// # Errors
    ///
    /// Fails when the post does not exist or results cannot be persisted.
    /// Per-account failures are reported in the returned [`PublishReport`].
    pub async fn publish(
        &self,
        post_id: &str,
        accounts: &[SocialAccount],
        media: &[MediaRef],
        captions: &HashMap<String, String>,
    ) -> Result<PublishReport> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| SocialcastError::InvalidInput(format!("Post not found: {}", post_id)))?;

        self.orchestrator.publish(&post, accounts, media, captions).await
    }

    pub fn rate_limit_status(&self, platform: &str, account_id: &str) -> RateLimitStatus {
        self.rate_limiter().get_status(platform, account_id)
    }

    pub fn account_health(&self, platform: &str, account_id: &str) -> AccountHealthSnapshot {
        self.health().get_health(platform, account_id)
    }

    pub fn accounts_needing_attention(&self) -> Vec<AccountHealthSnapshot> {
        self.health().get_accounts_needing_attention()
    }

    pub async fn refresh_expiring_tokens(&self, accounts: &[SocialAccount]) -> Vec<TokenRefresh> {
        self.tokens.refresh_expiring(accounts).await
    }
}
