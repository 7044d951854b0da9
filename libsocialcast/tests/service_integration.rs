//! Integration tests for SocialcastService
//!
//! Exercises the service as a host would: configuration in, posts stored in
//! SQLite, publishing by id, diagnostics and token refresh out.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use libsocialcast::config::{Config, DatabaseConfig};
use libsocialcast::health::HealthStatus;
use libsocialcast::platforms::mock::MockPublisher;
use libsocialcast::platforms::PublisherRegistry;
use libsocialcast::rate_limiter::RateBudget;
use libsocialcast::service::events::Event;
use libsocialcast::service::SocialcastService;
use libsocialcast::types::{MediaRef, Post, PostStatus, PostType, SocialAccount};
use libsocialcast::{Clock, ManualClock};
use serial_test::serial;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        database: DatabaseConfig {
            path: temp_dir.path().join("socialcast.db").to_string_lossy().to_string(),
        },
        ..Config::default_config()
    }
}

async fn setup_service(
    registry: PublisherRegistry,
) -> Result<(SocialcastService, Arc<ManualClock>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 3, 14, 0, 0).unwrap(),
    ));
    let service = SocialcastService::from_config_with_clock(
        test_config(&temp_dir),
        Arc::new(registry),
        clock.clone(),
    )
    .await?;
    Ok((service, clock, temp_dir))
}

#[tokio::test]
async fn test_publish_stored_post_by_id() -> Result<()> {
    let publisher = Arc::new(MockPublisher::success("instagram"));
    let registry = PublisherRegistry::new().with_platform("instagram", publisher.clone());
    let (service, _clock, _temp_dir) = setup_service(registry).await?;

    let post = Post::new("Sunset".to_string())
        .with_hashtags(["travel", "photo"])
        .with_post_type(PostType::Carousel);
    service.database().create_post(&post).await?;

    let accounts = vec![SocialAccount::new("ig-1", "instagram", "token")];
    let media = vec![
        MediaRef::new("m1", "/media/1.jpg"),
        MediaRef::new("m2", "/media/2.jpg"),
    ];
    let report = service
        .publish(&post.id, &accounts, &media, &HashMap::new())
        .await?;

    assert_eq!(report.aggregate_status, PostStatus::Published);
    assert_eq!(report.outcomes[0].platform_media_ids.len(), 2);
    assert_eq!(publisher.published_texts(), vec!["Sunset\n\n#travel #photo"]);

    let stored = service.database().get_post(&post.id).await?.unwrap();
    assert_eq!(stored.status, PostStatus::Published);

    let rows = service.database().get_post_platforms(&post.id).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].platform_post_id, report.outcomes[0].platform_post_id);

    let status = service.rate_limit_status("instagram", "ig-1");
    assert_eq!(status.api_calls_used, 1);
    assert_eq!(status.publishes_remaining_today, 24);
    assert_eq!(service.account_health("instagram", "ig-1").total_publishes, 1);
    Ok(())
}

#[tokio::test]
async fn test_publish_unknown_post_fails() -> Result<()> {
    let (service, _clock, _temp_dir) = setup_service(PublisherRegistry::new()).await?;

    let err = service
        .publish("does-not-exist", &[], &[], &HashMap::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Post not found: does-not-exist"));
    Ok(())
}

#[tokio::test]
async fn test_configured_budgets_apply() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = test_config(&temp_dir);
    config.rate_limits.insert(
        "twitter".to_string(),
        RateBudget::new(10, Duration::from_secs(60), 1),
    );
    let registry = PublisherRegistry::new()
        .with_platform("twitter", Arc::new(MockPublisher::success("twitter")));
    let service = SocialcastService::from_config(config, Arc::new(registry)).await?;

    let accounts = vec![SocialAccount::new("tw", "twitter", "t")];
    for expected in [PostStatus::Published, PostStatus::Failed] {
        let post = Post::new("Tweet".to_string());
        service.database().create_post(&post).await?;
        let report = service
            .publish(&post.id, &accounts, &[], &HashMap::new())
            .await?;
        assert_eq!(report.aggregate_status, expected);
    }
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = test_config(&temp_dir);
    config.health.warning_after_errors = 10;

    let result = SocialcastService::from_config(config, Arc::new(PublisherRegistry::new())).await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_progress_events_reach_subscribers() -> Result<()> {
    let registry = PublisherRegistry::new()
        .with_platform("twitter", Arc::new(MockPublisher::success("twitter")));
    let (service, _clock, _temp_dir) = setup_service(registry).await?;
    let mut receiver = service.subscribe();

    let post = Post::new("Events".to_string());
    service.database().create_post(&post).await?;
    let accounts = vec![SocialAccount::new("a", "twitter", "t")];
    service
        .publish(&post.id, &accounts, &[], &HashMap::new())
        .await?;

    let mut completed = None;
    while let Ok(event) = receiver.try_recv() {
        if let Event::PublishCompleted { status, published, .. } = event {
            completed = Some((status, published));
        }
    }
    assert_eq!(completed, Some((PostStatus::Published, 1)));
    Ok(())
}

#[tokio::test]
async fn test_token_refresh_through_service() -> Result<()> {
    let registry = PublisherRegistry::new()
        .with_platform("tiktok", Arc::new(MockPublisher::success("tiktok")))
        .with_account(
            "revoked",
            Arc::new(MockPublisher::refresh_failure("tiktok", "invalid_grant")),
        );
    let (service, clock, _temp_dir) = setup_service(registry).await?;
    let soon = clock.now() + chrono::Duration::hours(2);

    let accounts = vec![
        SocialAccount::new("fine", "tiktok", "t")
            .with_refresh_token("r")
            .with_token_expiry(soon),
        SocialAccount::new("revoked", "tiktok", "t")
            .with_refresh_token("r")
            .with_token_expiry(soon),
    ];

    let results = service.refresh_expiring_tokens(&accounts).await;
    assert_eq!(results.len(), 2);
    assert!(results[0].is_refreshed());
    assert!(!results[1].is_refreshed());

    assert_eq!(service.account_health("tiktok", "fine").status, HealthStatus::Healthy);
    let attention = service.accounts_needing_attention();
    assert_eq!(attention.len(), 1);
    assert_eq!(attention[0].account_id, "revoked");
    assert_eq!(attention[0].status, HealthStatus::Disconnected);
    Ok(())
}

#[test]
#[serial]
fn test_config_load_from_env_path() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
            [publishing]
            acquire_timeout = "5m"

            [rate_limits.instagram]
            max_requests = 20
            window = "1h"
            max_publishes_per_day = 3
        "#,
    )?;

    std::env::set_var("SOCIALCAST_CONFIG", &path);
    let config = Config::load();
    std::env::remove_var("SOCIALCAST_CONFIG");

    let config = config?;
    assert_eq!(config.publishing.acquire_timeout, Some(Duration::from_secs(300)));
    assert_eq!(config.rate_budgets().budget_for("instagram").max_publishes_per_day, 3);
    Ok(())
}
