//! OAuth identity repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::OAuthIdentityEntity;
use crate::metrics::QueryTimer;

/// Repository for linked provider accounts and their sealed refresh tokens.
#[derive(Clone)]
pub struct OAuthIdentityRepository {
    pool: PgPool,
}

impl OAuthIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user's identity for a provider.
    pub async fn find_by_user(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<OAuthIdentityEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_oauth_identity_by_user");
        let result = sqlx::query_as::<_, OAuthIdentityEntity>(
            r#"
            SELECT * FROM oauth_identities WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Create or refresh a user's identity after a completed consent flow.
    ///
    /// `sealed_refresh_token` must already be sealed. A `None` token keeps the
    /// stored one, since providers only return it on first consent.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
        email: Option<&str>,
        sealed_refresh_token: Option<&str>,
    ) -> Result<OAuthIdentityEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_oauth_identity");
        let result = sqlx::query_as::<_, OAuthIdentityEntity>(
            r#"
            INSERT INTO oauth_identities (user_id, provider, provider_user_id, email, refresh_token, connected)
            VALUES ($1, $2, $3, $4, $5, $5 IS NOT NULL)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                provider_user_id = EXCLUDED.provider_user_id,
                email = COALESCE(EXCLUDED.email, oauth_identities.email),
                refresh_token = COALESCE(EXCLUDED.refresh_token, oauth_identities.refresh_token),
                connected = COALESCE(EXCLUDED.refresh_token, oauth_identities.refresh_token) IS NOT NULL,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_user_id)
        .bind(email)
        .bind(sealed_refresh_token)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Forget a revoked refresh token and mark the identity disconnected.
    pub async fn clear_token(&self, id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("clear_oauth_refresh_token");
        let result = sqlx::query(
            r#"
            UPDATE oauth_identities
            SET refresh_token = NULL, connected = false, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Record the time of the last successful reconciliation.
    pub async fn touch_sync(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("touch_oauth_identity_sync");
        let result = sqlx::query(
            r#"
            UPDATE oauth_identities SET last_sync_at = $2 WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Connected identities of active advisors.
    pub async fn list_connected_advisors(
        &self,
        provider: &str,
    ) -> Result<Vec<OAuthIdentityEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_connected_advisor_identities");
        let result = sqlx::query_as::<_, OAuthIdentityEntity>(
            r#"
            SELECT oi.*
            FROM oauth_identities oi
            JOIN advisor_profiles ap ON ap.user_id = oi.user_id
            WHERE oi.provider = $1
              AND oi.connected
              AND oi.refresh_token IS NOT NULL
              AND ap.active
            ORDER BY oi.user_id
            "#,
        )
        .bind(provider)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}
