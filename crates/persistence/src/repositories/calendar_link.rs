//! Calendar link repository for database operations.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::CalendarLinkEntity;
use crate::metrics::QueryTimer;

/// Repository for appointment to provider-event links.
#[derive(Clone)]
pub struct CalendarLinkRepository {
    pool: PgPool,
}

impl CalendarLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the link of an appointment.
    pub async fn find_by_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Option<CalendarLinkEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_calendar_link_by_appointment");
        let result = sqlx::query_as::<_, CalendarLinkEntity>(
            r#"
            SELECT * FROM calendar_links WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Store the link of a freshly created event.
    ///
    /// Returns `None` if the appointment already has a link.
    pub async fn insert(
        &self,
        appointment_id: Uuid,
        identity_id: Uuid,
        provider: &str,
        provider_event_id: &str,
        html_link: Option<&str>,
    ) -> Result<Option<CalendarLinkEntity>, sqlx::Error> {
        let timer = QueryTimer::new("insert_calendar_link");
        let result = sqlx::query_as::<_, CalendarLinkEntity>(
            r#"
            INSERT INTO calendar_links (appointment_id, identity_id, provider, provider_event_id, html_link)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (appointment_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(appointment_id)
        .bind(identity_id)
        .bind(provider)
        .bind(provider_event_id)
        .bind(html_link)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Bump `updated_at` after a successful patch.
    pub async fn touch(&self, id: Uuid) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("touch_calendar_link");
        let result = sqlx::query(
            r#"
            UPDATE calendar_links SET updated_at = NOW() WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Drop an appointment's link inside a transaction.
    pub async fn delete_by_appointment(
        conn: &mut PgConnection,
        appointment_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_calendar_link");
        let result = sqlx::query(
            r#"
            DELETE FROM calendar_links WHERE appointment_id = $1
            "#,
        )
        .bind(appointment_id)
        .execute(&mut *conn)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}
