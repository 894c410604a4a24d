use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Stored video metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Video {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    /// Storage reference (`bucket,key`) when persisted; a signed URL in
    /// responses. `None` until a video has been uploaded.
    pub video_url: Option<String>,
    /// Owner
    pub user_id: Uuid,
}

/// Caller-supplied fields for a new record; the owner comes from the token
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVideoParams {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Relational metadata store for video records
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn create_video(&self, user_id: Uuid, params: &CreateVideoParams) -> Result<Video>;

    async fn get_video(&self, id: Uuid) -> Result<Option<Video>>;

    /// Videos owned by `user_id`, newest first
    async fn list_videos(&self, user_id: Uuid) -> Result<Vec<Video>>;

    /// Persist every mutable field of `video`. Last writer wins.
    async fn update_video(&self, video: &Video) -> Result<()>;

    async fn delete_video(&self, id: Uuid) -> Result<()>;

    /// Connectivity probe for readiness checks
    async fn ping(&self) -> Result<()>;
}

/// PostgreSQL-backed video repository
pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    /// Create a new store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for PgVideoStore {
    #[instrument(skip(self, params))]
    async fn create_video(&self, user_id: Uuid, params: &CreateVideoParams) -> Result<Video> {
        let video = sqlx::query_as::<_, Video>(
            r#"
            INSERT INTO videos (
                id, created_at, updated_at, title, description,
                thumbnail_url, video_url, user_id
            ) VALUES (
                $1, NOW(), NOW(), $2, $3, NULL, NULL, $4
            )
            RETURNING id, created_at, updated_at, title, description,
                      thumbnail_url, video_url, user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&params.title)
        .bind(&params.description)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert video")?;

        debug!(video_id = %video.id, "Video record created");
        metrics::counter!("video.records.created").increment(1);

        Ok(video)
    }

    async fn get_video(&self, id: Uuid) -> Result<Option<Video>> {
        let video = sqlx::query_as::<_, Video>(
            r#"
            SELECT id, created_at, updated_at, title, description,
                   thumbnail_url, video_url, user_id
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query video")?;

        Ok(video)
    }

    #[instrument(skip(self))]
    async fn list_videos(&self, user_id: Uuid) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(
            r#"
            SELECT id, created_at, updated_at, title, description,
                   thumbnail_url, video_url, user_id
            FROM videos
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list videos")?;

        Ok(videos)
    }

    #[instrument(skip(self, video), fields(video_id = %video.id))]
    async fn update_video(&self, video: &Video) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET title = $2,
                description = $3,
                thumbnail_url = $4,
                video_url = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .execute(&self.pool)
        .await
        .context("Failed to update video")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Video {} no longer exists", video.id);
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_video(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete video")?;

        info!(video_id = %id, "Video record deleted");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database unreachable")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_params_description_optional() {
        let params: CreateVideoParams = serde_json::from_str(r#"{"title": "Boots"}"#).unwrap();
        assert_eq!(params.title, "Boots");
        assert!(params.description.is_empty());
    }

    #[test]
    fn test_create_params_ignore_owner_field() {
        let params: CreateVideoParams = serde_json::from_str(
            r#"{"title": "t", "description": "d", "user_id": "550e8400-e29b-41d4-a716-446655440000"}"#,
        )
        .unwrap();
        assert_eq!(params.description, "d");
    }

    #[test]
    fn test_video_serializes_unset_reference_as_null() {
        let video = Video {
            id: Uuid::nil(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            title: "t".to_string(),
            description: String::new(),
            thumbnail_url: None,
            video_url: None,
            user_id: Uuid::nil(),
        };

        let json = serde_json::to_value(&video).unwrap();
        assert!(json["video_url"].is_null());
    }
}
