//! Watch channel repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::WatchChannelEntity;
use crate::metrics::QueryTimer;

/// Repository for provider push-notification channels.
#[derive(Clone)]
pub struct WatchChannelRepository {
    pool: PgPool,
}

impl WatchChannelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_channel_id(
        &self,
        channel_id: Uuid,
    ) -> Result<Option<WatchChannelEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_watch_channel");
        let result = sqlx::query_as::<_, WatchChannelEntity>(
            r#"
            SELECT * FROM watch_channels WHERE channel_id = $1
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// The user's channel expiring last, if it is still valid after `after`.
    pub async fn find_live_for_user(
        &self,
        user_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Option<WatchChannelEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_live_watch_channel");
        let result = sqlx::query_as::<_, WatchChannelEntity>(
            r#"
            SELECT * FROM watch_channels
            WHERE user_id = $1 AND expires_at > $2
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(after)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<WatchChannelEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_watch_channels_for_user");
        let result = sqlx::query_as::<_, WatchChannelEntity>(
            r#"
            SELECT * FROM watch_channels WHERE user_id = $1 ORDER BY expires_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Channels that lapse before `threshold`, including already expired ones.
    pub async fn list_expiring(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<WatchChannelEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_expiring_watch_channels");
        let result = sqlx::query_as::<_, WatchChannelEntity>(
            r#"
            SELECT * FROM watch_channels WHERE expires_at <= $1 ORDER BY expires_at
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn insert(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        resource_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<WatchChannelEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_watch_channel");
        let result = sqlx::query_as::<_, WatchChannelEntity>(
            r#"
            INSERT INTO watch_channels (channel_id, user_id, resource_id, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(resource_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn delete(&self, channel_id: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_watch_channel");
        let result = sqlx::query(
            r#"
            DELETE FROM watch_channels WHERE channel_id = $1
            "#,
        )
        .bind(channel_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    /// Channels still valid at `now`, across all users.
    pub async fn count_live(&self, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_live_watch_channels");
        let result = sqlx::query_scalar("SELECT COUNT(*) FROM watch_channels WHERE expires_at > $1")
            .bind(now)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result
    }
}
