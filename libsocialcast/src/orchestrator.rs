//! Fan-out publishing of one post to many accounts
//!
//! [`PublishOrchestrator::publish`] marks the post as publishing, runs one
//! task per distinct target account, waits for all of them, reduces the
//! per-account outcomes to a post status and persists everything in one
//! transaction. Per-account failures (quota, throttling, refusals, transport
//! errors, panics) become failed outcomes; only persistence errors are
//! returned as `Err`.

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::db::PublishStore;
use crate::error::{FailureKind, Result};
use crate::health::AccountHealthTracker;
use crate::platforms::{PlatformPostResult, PlatformPublisher, PublishRequest, PublisherFactory};
use crate::rate_limiter::RateLimiter;
use crate::service::events::{Event, EventBus, PublishStage};
use crate::types::{AccountOutcome, MediaRef, Post, PostStatus, PublishReport, SocialAccount};

pub const DAILY_LIMIT_REACHED: &str = "daily limit reached";
pub const ACCOUNT_INACTIVE: &str = "account is inactive";
pub const RATE_LIMIT_WAIT_EXCEEDED: &str = "rate limit wait exceeded";
pub const TASK_PANICKED: &str = "publish task panicked";

pub struct PublishOrchestrator {
    store: Arc<dyn PublishStore>,
    publishers: Arc<dyn PublisherFactory>,
    rate_limiter: Arc<RateLimiter>,
    health: Arc<AccountHealthTracker>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    acquire_timeout: Option<Duration>,
}

impl PublishOrchestrator {
    pub fn new(
        store: Arc<dyn PublishStore>,
        publishers: Arc<dyn PublisherFactory>,
        rate_limiter: Arc<RateLimiter>,
        health: Arc<AccountHealthTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publishers,
            rate_limiter,
            health,
            clock,
            events: EventBus::default(),
            acquire_timeout: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Bound how long a branch may wait for a rate-limit slot
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn health(&self) -> &Arc<AccountHealthTracker> {
        &self.health
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Publish `post` to every account in `accounts`
    ///
    /// `captions` maps account ids to caption overrides. An account listed
    /// more than once is published to once.
    ///
    /// # Errors
    ///
    /// Only persistence failures are returned; the report is otherwise always
    /// complete, with exactly one settled outcome per distinct account.
    pub async fn publish(
        &self,
        post: &Post,
        accounts: &[SocialAccount],
        media: &[MediaRef],
        captions: &HashMap<String, String>,
    ) -> Result<PublishReport> {
        self.store.mark_publishing(&post.id).await?;

        let mut seen = HashSet::new();
        let targets: Vec<&SocialAccount> = accounts
            .iter()
            .filter(|account| seen.insert(account.id.as_str()))
            .collect();

        info!("Publishing post {} to {} account(s)", post.id, targets.len());
        self.events.emit(Event::PublishStarted {
            post_id: post.id.clone(),
            accounts: targets.iter().map(|a| a.id.clone()).collect(),
        });

        let media_paths: Vec<String> = media.iter().map(|m| m.file_path.clone()).collect();
        let branches: Vec<PendingBranch> = targets
            .into_iter()
            .map(|account| self.start_branch(post, account, &media_paths, captions))
            .collect();

        let outcomes: Vec<AccountOutcome> = join_all(branches.into_iter().map(|branch| async move {
            let outcome = branch.settle(self.clock.as_ref(), &self.health).await;
            self.events.emit(Event::AccountSettled {
                post_id: post.id.clone(),
                outcome: outcome.clone(),
            });
            outcome
        }))
        .await;

        let status = PostStatus::aggregate(&outcomes);

        if let Err(e) = self.store.save_outcomes(&post.id, &outcomes, status).await {
            error!("Failed to persist publish results for post {}: {}", post.id, e);
            return Err(e);
        }

        let report = PublishReport {
            post_id: post.id.clone(),
            outcomes,
            aggregate_status: status,
        };

        info!(
            "Post {} {}: {} published, {} failed",
            post.id,
            status,
            report.published_count(),
            report.failed_count()
        );
        self.events.emit(Event::PublishCompleted {
            post_id: post.id.clone(),
            status,
            published: report.published_count(),
            failed: report.failed_count(),
        });

        Ok(report)
    }

    /// Settle what can be decided up front; spawn a task for the rest
    fn start_branch(
        &self,
        post: &Post,
        account: &SocialAccount,
        media_paths: &[String],
        captions: &HashMap<String, String>,
    ) -> PendingBranch {
        if !account.is_active {
            warn!("Skipping inactive account {}:{}", account.platform, account.id);
            return PendingBranch::Settled(AccountOutcome::failed(
                &account.id,
                &account.platform,
                ACCOUNT_INACTIVE.to_string(),
                self.clock.now(),
            ));
        }

        let publisher = match self.publishers.publisher_for(account) {
            Ok(publisher) => publisher,
            Err(e) => {
                warn!("No publisher for {}:{}: {}", account.platform, account.id, e);
                return PendingBranch::Settled(AccountOutcome::failed(
                    &account.id,
                    &account.platform,
                    e.to_string(),
                    self.clock.now(),
                ));
            }
        };

        let caption_override = captions.get(&account.id).cloned();
        let branch = Branch {
            post_id: post.id.clone(),
            account_id: account.id.clone(),
            platform: account.platform.clone(),
            request: PublishRequest {
                text: post.render_text(caption_override.as_deref()),
                media_paths: media_paths.to_vec(),
                post_type: post.post_type,
            },
            caption_override,
            publisher,
            rate_limiter: Arc::clone(&self.rate_limiter),
            health: Arc::clone(&self.health),
            clock: Arc::clone(&self.clock),
            events: self.events.clone(),
            acquire_timeout: self.acquire_timeout,
        };

        PendingBranch::Running {
            account_id: account.id.clone(),
            platform: account.platform.clone(),
            handle: tokio::spawn(branch.run()),
        }
    }
}

enum PendingBranch {
    Settled(AccountOutcome),
    Running {
        account_id: String,
        platform: String,
        handle: JoinHandle<AccountOutcome>,
    },
}

impl PendingBranch {
    async fn settle(self, clock: &dyn Clock, health: &AccountHealthTracker) -> AccountOutcome {
        match self {
            PendingBranch::Settled(outcome) => outcome,
            PendingBranch::Running {
                account_id,
                platform,
                handle,
            } => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Publish task for {}:{} failed: {}", platform, account_id, e);
                    health.record_error(&platform, &account_id, TASK_PANICKED);
                    AccountOutcome::failed(
                        &account_id,
                        &platform,
                        TASK_PANICKED.to_string(),
                        clock.now(),
                    )
                }
            },
        }
    }
}

/// Everything one account's task needs, owned so it can be spawned
struct Branch {
    post_id: String,
    account_id: String,
    platform: String,
    request: PublishRequest,
    caption_override: Option<String>,
    publisher: Arc<dyn PlatformPublisher>,
    rate_limiter: Arc<RateLimiter>,
    health: Arc<AccountHealthTracker>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    acquire_timeout: Option<Duration>,
}

impl Branch {
    async fn run(self) -> AccountOutcome {
        let mut outcome = self.attempt().await;
        outcome.caption_override = self.caption_override.clone();
        outcome
    }

    fn progress(&self, stage: PublishStage) {
        self.events.emit(Event::AccountProgress {
            post_id: self.post_id.clone(),
            account_id: self.account_id.clone(),
            platform: self.platform.clone(),
            stage,
        });
    }

    fn failed(&self, message: String) -> AccountOutcome {
        AccountOutcome::failed(&self.account_id, &self.platform, message, self.clock.now())
    }

    async fn attempt(&self) -> AccountOutcome {
        self.progress(PublishStage::CheckingQuota);
        if !self.rate_limiter.can_publish(&self.platform, &self.account_id) {
            warn!("Daily publish limit reached for {}:{}", self.platform, self.account_id);
            return self.failed(DAILY_LIMIT_REACHED.to_string());
        }

        self.progress(PublishStage::WaitingForRateLimit);
        let acquire = self.rate_limiter.acquire(&self.platform, &self.account_id);
        match self.acquire_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, acquire).await.is_err() {
                    warn!(
                        "Gave up waiting {:?} for a rate-limit slot on {}:{}",
                        limit, self.platform, self.account_id
                    );
                    return self.failed(RATE_LIMIT_WAIT_EXCEEDED.to_string());
                }
            }
            None => acquire.await,
        }

        self.progress(PublishStage::Publishing);
        debug!("Calling {} for account {}", self.publisher.name(), self.account_id);

        match self.publisher.publish(&self.request).await {
            Ok(result) if result.success => self.on_success(result),
            Ok(result) => {
                let message = result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                let kind = FailureKind::from_message(&message);
                self.on_failure(message, kind, result.retry_after)
            }
            Err(e) => {
                let kind = e.failure_kind();
                self.on_failure(e.to_string(), kind, None)
            }
        }
    }

    fn on_success(&self, result: PlatformPostResult) -> AccountOutcome {
        self.rate_limiter.record_publish(&self.platform, &self.account_id);
        self.health.record_publish(&self.platform, &self.account_id);

        info!(
            "Published post {} to {}:{} ({})",
            self.post_id,
            self.platform,
            self.account_id,
            result.platform_post_id.as_deref().unwrap_or("no id")
        );

        AccountOutcome::published(
            &self.account_id,
            &self.platform,
            result.platform_post_id,
            result.platform_media_ids,
            self.clock.now(),
        )
    }

    fn on_failure(
        &self,
        message: String,
        kind: FailureKind,
        retry_after: Option<Duration>,
    ) -> AccountOutcome {
        warn!(
            "Publishing post {} to {}:{} failed: {}",
            self.post_id, self.platform, self.account_id, message
        );

        self.health.record_error(&self.platform, &self.account_id, &message);
        match kind {
            FailureKind::Auth => self.health.record_auth_failure(&self.platform, &self.account_id),
            FailureKind::Throttled => {
                self.rate_limiter
                    .record_rate_limit_hit(&self.platform, &self.account_id, retry_after)
            }
            FailureKind::Generic => {}
        }

        self.failed(message)
    }
}
