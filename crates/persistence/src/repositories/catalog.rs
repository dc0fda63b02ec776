//! Read-only lookups over users, profiles, services and resources.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{ProfileEntity, ResourceEntity, ServiceEntity, UserEntity};
use crate::metrics::QueryTimer;

/// Repository for the catalog tables the scheduler reads.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user");
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, email, display_name, is_admin FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Advisor profile owned by a user.
    pub async fn find_advisor_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ProfileEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_advisor_by_user");
        let result = sqlx::query_as::<_, ProfileEntity>(
            r#"
            SELECT id, user_id, active FROM advisor_profiles WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_advisor_by_id(&self, id: Uuid) -> Result<Option<ProfileEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_advisor_by_id");
        let result = sqlx::query_as::<_, ProfileEntity>(
            r#"
            SELECT id, user_id, active FROM advisor_profiles WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Teacher profile owned by a user.
    pub async fn find_teacher_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<ProfileEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_teacher_by_user");
        let result = sqlx::query_as::<_, ProfileEntity>(
            r#"
            SELECT id, user_id, active FROM teacher_profiles WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_teacher_by_id(&self, id: Uuid) -> Result<Option<ProfileEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_teacher_by_id");
        let result = sqlx::query_as::<_, ProfileEntity>(
            r#"
            SELECT id, user_id, active FROM teacher_profiles WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Whether the advisor is assigned the service.
    pub async fn advisor_has_service(
        &self,
        advisor_id: Uuid,
        service_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("advisor_has_service");
        let result = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM advisor_services WHERE advisor_id = $1 AND service_id = $2
            )
            "#,
        )
        .bind(advisor_id)
        .bind(service_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_service(&self, id: Uuid) -> Result<Option<ServiceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_service");
        let result = sqlx::query_as::<_, ServiceEntity>(
            r#"
            SELECT id, name, duration_minutes, active FROM services WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_resource(&self, id: Uuid) -> Result<Option<ResourceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_resource");
        let result = sqlx::query_as::<_, ResourceEntity>(
            r#"
            SELECT id, building_id, name, kind, capacity, active FROM resources WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// User ids of all active advisors.
    pub async fn list_active_advisor_user_ids(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        let timer = QueryTimer::new("list_active_advisor_user_ids");
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM advisor_profiles WHERE active ORDER BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Human-readable location, "Building · Resource".
    pub async fn resource_location(&self, id: Uuid) -> Result<Option<String>, sqlx::Error> {
        let timer = QueryTimer::new("resource_location");
        let result = sqlx::query_scalar::<_, String>(
            r#"
            SELECT b.name || ' · ' || r.name
            FROM resources r
            JOIN buildings b ON b.id = r.building_id
            WHERE r.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }
}
