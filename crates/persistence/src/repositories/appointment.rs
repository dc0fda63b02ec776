//! Appointment repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{
    AppointmentEntity, AppointmentStateDb, BackfillCandidateEntity, PendingAppointmentEntity,
    ReconcileCandidateEntity,
};
use crate::metrics::QueryTimer;

/// Repository for appointment-related database operations.
#[derive(Clone)]
pub struct AppointmentRepository {
    pool: PgPool,
}

impl AppointmentRepository {
    /// Creates a new AppointmentRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find an appointment by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AppointmentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_appointment_by_id");
        let result = sqlx::query_as::<_, AppointmentEntity>(
            r#"
            SELECT * FROM appointments WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Pending appointments on slots owned by an advisor profile.
    pub async fn list_pending_for_advisor(
        &self,
        advisor_id: Uuid,
    ) -> Result<Vec<PendingAppointmentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_pending_for_advisor");
        let result = sqlx::query_as::<_, PendingAppointmentEntity>(
            r#"
            SELECT a.id, a.slot_id, a.state, a.origin, a.notes, a.created_at,
                   a.teacher_id, s.advisor_id, s.service_id, s.resource_id,
                   s.start_time, s.end_time,
                   COALESCE(u.display_name, u.email) AS counterpart_name
            FROM appointments a
            JOIN slots s ON s.id = a.slot_id
            JOIN teacher_profiles tp ON tp.id = a.teacher_id
            JOIN users u ON u.id = tp.user_id
            WHERE s.advisor_id = $1 AND a.state = 'PENDING'
            ORDER BY s.start_time, a.id
            "#,
        )
        .bind(advisor_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Pending appointments booked by a teacher profile.
    pub async fn list_pending_for_teacher(
        &self,
        teacher_id: Uuid,
    ) -> Result<Vec<PendingAppointmentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_pending_for_teacher");
        let result = sqlx::query_as::<_, PendingAppointmentEntity>(
            r#"
            SELECT a.id, a.slot_id, a.state, a.origin, a.notes, a.created_at,
                   a.teacher_id, s.advisor_id, s.service_id, s.resource_id,
                   s.start_time, s.end_time,
                   COALESCE(u.display_name, u.email) AS counterpart_name
            FROM appointments a
            JOIN slots s ON s.id = a.slot_id
            JOIN advisor_profiles ap ON ap.id = s.advisor_id
            JOIN users u ON u.id = ap.user_id
            WHERE a.teacher_id = $1 AND a.state = 'PENDING'
            ORDER BY s.start_time, a.id
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Linked appointments where the user is the advisor or the teacher.
    pub async fn find_reconcile_candidates(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ReconcileCandidateEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_reconcile_candidates");
        let result = sqlx::query_as::<_, ReconcileCandidateEntity>(
            r#"
            SELECT a.id AS appointment_id, a.state AS appointment_state,
                   s.id AS slot_id, s.state AS slot_state,
                   ap.user_id AS advisor_user_id, tp.user_id AS teacher_user_id,
                   tu.email AS teacher_email,
                   cl.id AS link_id, cl.provider_event_id
            FROM appointments a
            JOIN slots s ON s.id = a.slot_id
            JOIN advisor_profiles ap ON ap.id = s.advisor_id
            JOIN teacher_profiles tp ON tp.id = a.teacher_id
            JOIN users tu ON tu.id = tp.user_id
            JOIN calendar_links cl ON cl.appointment_id = a.id
            WHERE a.state IN ('PENDING', 'CONFIRMED', 'CANCELLED')
              AND (ap.user_id = $1 OR tp.user_id = $1)
            ORDER BY s.start_time, a.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Active appointments without a calendar link whose slot has not started.
    pub async fn find_backfill_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BackfillCandidateEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_backfill_candidates");
        let result = sqlx::query_as::<_, BackfillCandidateEntity>(
            r#"
            SELECT a.id AS appointment_id, s.id AS slot_id, ap.user_id AS advisor_user_id
            FROM appointments a
            JOIN slots s ON s.id = a.slot_id
            JOIN advisor_profiles ap ON ap.id = s.advisor_id
            LEFT JOIN calendar_links cl ON cl.appointment_id = a.id
            WHERE a.state IN ('PENDING', 'CONFIRMED')
              AND cl.id IS NULL
              AND s.start_time > $1
            ORDER BY s.start_time
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Lock an appointment row for the rest of the transaction.
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<AppointmentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("lock_appointment_by_id");
        let result = sqlx::query_as::<_, AppointmentEntity>(
            r#"
            SELECT * FROM appointments WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// The slot's active appointment, or its most recent one otherwise.
    pub async fn find_current_for_slot(
        conn: &mut PgConnection,
        slot_id: Uuid,
    ) -> Result<Option<AppointmentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_current_appointment_for_slot");
        let result = sqlx::query_as::<_, AppointmentEntity>(
            r#"
            SELECT * FROM appointments
            WHERE slot_id = $1
            ORDER BY (state IN ('PENDING', 'CONFIRMED')) DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(slot_id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Create a PENDING appointment.
    pub async fn insert_pending(
        conn: &mut PgConnection,
        teacher_id: Uuid,
        slot_id: Uuid,
        origin: &str,
        notes: Option<&str>,
    ) -> Result<AppointmentEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_appointment");
        let result = sqlx::query_as::<_, AppointmentEntity>(
            r#"
            INSERT INTO appointments (teacher_id, slot_id, state, origin, notes)
            VALUES ($1, $2, 'PENDING', $3, $4)
            RETURNING *
            "#,
        )
        .bind(teacher_id)
        .bind(slot_id)
        .bind(origin)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Set an appointment's state.
    pub async fn update_state(
        conn: &mut PgConnection,
        id: Uuid,
        state: AppointmentStateDb,
    ) -> Result<AppointmentEntity, sqlx::Error> {
        let timer = QueryTimer::new("update_appointment_state");
        let result = sqlx::query_as::<_, AppointmentEntity>(
            r#"
            UPDATE appointments SET state = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(state)
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }
}
