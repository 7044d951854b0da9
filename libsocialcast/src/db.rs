//! Database operations for Socialcast
//!
//! Timestamps are stored as Unix seconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::error;

use crate::error::{DbError, Result, SocialcastError};
use crate::types::{AccountOutcome, AttemptStatus, Post, PostPlatformRecord, PostStatus, PostType};

/// Persistence callbacks used while publishing
#[async_trait]
pub trait PublishStore: Send + Sync {
    /// Flag the post as in flight before any platform is contacted
    async fn mark_publishing(&self, post_id: &str) -> Result<()>;

    /// Write every per-account outcome and the aggregate status as one unit
    async fn save_outcomes(
        &self,
        post_id: &str,
        outcomes: &[AccountOutcome],
        status: PostStatus,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            // Every pooled connection would otherwise get its own empty database
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let hashtags = serde_json::to_string(&post.hashtags)
            .map_err(|e| DbError::CorruptRow(format!("hashtags for post {}: {}", post.id, e)))?;

        sqlx::query(
            r#"
            INSERT INTO posts
                (id, caption, hashtags, post_type, status, created_at, updated_at, scheduled_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.caption)
        .bind(hashtags)
        .bind(post.post_type.as_str())
        .bind(post.status.as_str())
        .bind(post.created_at.timestamp())
        .bind(post.created_at.timestamp())
        .bind(post.scheduled_at.map(|at| at.timestamp()))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, caption, hashtags, post_type, status, created_at, scheduled_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let hashtags: String = row.get("hashtags");
        let post_type: String = row.get("post_type");
        let status: String = row.get("status");

        Ok(Some(Post {
            id: row.get("id"),
            caption: row.get("caption"),
            hashtags: serde_json::from_str(&hashtags)
                .map_err(|e| DbError::CorruptRow(format!("hashtags for post {}: {}", post_id, e)))?,
            post_type: post_type.parse::<PostType>().map_err(DbError::CorruptRow)?,
            status: status.parse::<PostStatus>().map_err(DbError::CorruptRow)?,
            created_at: from_timestamp(row.get("created_at")),
            scheduled_at: row.get::<Option<i64>, _>("scheduled_at").map(from_timestamp),
        }))
    }

    pub async fn update_post_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        let result = sqlx::query("UPDATE posts SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().timestamp())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(post_not_found(post_id));
        }
        Ok(())
    }

    /// Per-account rows for a post, in insertion order
    pub async fn get_post_platforms(&self, post_id: &str) -> Result<Vec<PostPlatformRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT post_id, social_account_id, platform, platform_post_id, platform_media_ids,
                   status, error_message, published_at, platform_specific_caption
            FROM post_platforms
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| -> Result<PostPlatformRecord> {
                let media_ids: String = r.get("platform_media_ids");
                let status: String = r.get("status");
                Ok(PostPlatformRecord {
                    post_id: r.get("post_id"),
                    social_account_id: r.get("social_account_id"),
                    platform: r.get("platform"),
                    platform_post_id: r.get("platform_post_id"),
                    platform_media_ids: serde_json::from_str(&media_ids).map_err(|e| {
                        DbError::CorruptRow(format!("media ids for post {}: {}", post_id, e))
                    })?,
                    status: status.parse::<AttemptStatus>().map_err(DbError::CorruptRow)?,
                    error_message: r.get("error_message"),
                    published_at: r.get::<Option<i64>, _>("published_at").map(from_timestamp),
                    platform_specific_caption: r.get("platform_specific_caption"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl PublishStore for Database {
    async fn mark_publishing(&self, post_id: &str) -> Result<()> {
        self.update_post_status(post_id, PostStatus::Publishing).await
    }

    async fn save_outcomes(
        &self,
        post_id: &str,
        outcomes: &[AccountOutcome],
        status: PostStatus,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        for outcome in outcomes {
            let media_ids = serde_json::to_string(&outcome.platform_media_ids).map_err(|e| {
                DbError::CorruptRow(format!("media ids for {}: {}", outcome.account_id, e))
            })?;
            let published_at = outcome.is_published().then(|| outcome.attempted_at.timestamp());

            sqlx::query(
                r#"
                INSERT INTO post_platforms (
                    post_id, social_account_id, platform, platform_post_id, platform_media_ids,
                    status, error_message, published_at, platform_specific_caption
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(post_id, social_account_id) DO UPDATE SET
                    platform = excluded.platform,
                    platform_post_id = excluded.platform_post_id,
                    platform_media_ids = excluded.platform_media_ids,
                    status = excluded.status,
                    error_message = excluded.error_message,
                    published_at = excluded.published_at,
                    platform_specific_caption = excluded.platform_specific_caption
                "#,
            )
            .bind(post_id)
            .bind(&outcome.account_id)
            .bind(&outcome.platform)
            .bind(&outcome.platform_post_id)
            .bind(media_ids)
            .bind(outcome.status.as_str())
            .bind(&outcome.error)
            .bind(published_at)
            .bind(&outcome.caption_override)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        let result = sqlx::query("UPDATE posts SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().timestamp())
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the per-account rows
            error!("Post {} vanished while saving publish outcomes", post_id);
            return Err(post_not_found(post_id));
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }
}

fn post_not_found(post_id: &str) -> SocialcastError {
    SocialcastError::InvalidInput(format!("Post not found: {}", post_id))
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
