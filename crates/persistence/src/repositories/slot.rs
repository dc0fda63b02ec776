//! Slot repository for database operations.
//!
//! Functions taking `&mut PgConnection` run inside the caller's transaction;
//! methods on the repository use the pool directly.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{SlotEntity, SlotIntervalEntity, SlotStateDb, SweepCountsEntity};
use crate::metrics::QueryTimer;

/// Filters for open-slot searches.
#[derive(Debug, Clone, Default)]
pub struct OpenSlotFilter {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub service_id: Option<Uuid>,
    pub campus_id: Option<Uuid>,
    pub building_id: Option<Uuid>,
    pub resource_id: Option<Uuid>,
    pub limit: i64,
}

/// Which owner column a conflict query compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimScope {
    Resource,
    Advisor,
}

impl ClaimScope {
    fn column(&self) -> &'static str {
        match self {
            ClaimScope::Resource => "resource_id",
            ClaimScope::Advisor => "advisor_id",
        }
    }
}

/// Repository for slot-related database operations.
#[derive(Clone)]
pub struct SlotRepository {
    pool: PgPool,
}

impl SlotRepository {
    /// Creates a new SlotRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a slot by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<SlotEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_slot_by_id");
        let result = sqlx::query_as::<_, SlotEntity>(
            r#"
            SELECT * FROM slots WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Search bookable slots.
    pub async fn find_open(&self, filter: &OpenSlotFilter) -> Result<Vec<SlotEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_open_slots");
        let result = sqlx::query_as::<_, SlotEntity>(
            r#"
            SELECT s.*
            FROM slots s
            JOIN resources r ON r.id = s.resource_id
            JOIN buildings b ON b.id = r.building_id
            WHERE s.state = 'OPEN'
              AND s.start_time >= $1
              AND s.start_time < $2
              AND s.end_time > $3
              AND ($4::uuid IS NULL OR s.service_id = $4)
              AND ($5::uuid IS NULL OR b.campus_id = $5)
              AND ($6::uuid IS NULL OR r.building_id = $6)
              AND ($7::uuid IS NULL OR s.resource_id = $7)
            ORDER BY s.start_time, s.id
            LIMIT $8
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.now)
        .bind(filter.service_id)
        .bind(filter.campus_id)
        .bind(filter.building_id)
        .bind(filter.resource_id)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Advance every ended OPEN slot to EXPIRED and every ended RESERVED slot
    /// to REALIZED, completing its appointment, in one statement.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepCountsEntity, sqlx::Error> {
        let timer = QueryTimer::new("sweep_slots");
        let result = sqlx::query_as::<_, SweepCountsEntity>(
            r#"
            WITH expired AS (
                UPDATE slots SET state = 'EXPIRED', updated_at = NOW()
                WHERE state = 'OPEN' AND end_time < $1
                RETURNING id
            ),
            realized AS (
                UPDATE slots SET state = 'REALIZED', updated_at = NOW()
                WHERE state = 'RESERVED' AND end_time < $1
                RETURNING id
            ),
            completed AS (
                UPDATE appointments SET state = 'COMPLETED', updated_at = NOW()
                WHERE slot_id IN (SELECT id FROM realized)
                  AND state IN ('PENDING', 'CONFIRMED')
                RETURNING id
            )
            SELECT
                (SELECT COUNT(*) FROM expired) AS expired,
                (SELECT COUNT(*) FROM realized) AS realized,
                (SELECT COUNT(*) FROM completed) AS completed_appointments
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Lock a slot row for the rest of the transaction.
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<SlotEntity>, sqlx::Error> {
        let timer = QueryTimer::new("lock_slot_by_id");
        let result = sqlx::query_as::<_, SlotEntity>(
            r#"
            SELECT * FROM slots WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Claiming slots of `owner_id` overlapping any of the candidate intervals.
    ///
    /// `starts` and `ends` are parallel arrays. `exclude` skips one slot id.
    pub async fn find_conflicts(
        conn: &mut PgConnection,
        scope: ClaimScope,
        owner_id: Uuid,
        starts: &[DateTime<Utc>],
        ends: &[DateTime<Utc>],
        exclude: Option<Uuid>,
    ) -> Result<Vec<SlotIntervalEntity>, sqlx::Error> {
        let timer = QueryTimer::new(format!("find_{}_conflicts", scope.column()));
        let sql = format!(
            r#"
            SELECT DISTINCT s.id AS slot_id, s.start_time, s.end_time
            FROM slots s
            JOIN UNNEST($2::timestamptz[], $3::timestamptz[]) AS c(start_time, end_time)
              ON tstzrange(s.start_time, s.end_time, '[)') && tstzrange(c.start_time, c.end_time, '[)')
            WHERE s.{column} = $1
              AND s.state IN ('OPEN', 'RESERVED', 'CANCELLED')
              AND ($4::uuid IS NULL OR s.id <> $4)
            ORDER BY s.start_time, s.id
            "#,
            column = scope.column()
        );
        let result = sqlx::query_as::<_, SlotIntervalEntity>(&sql)
            .bind(owner_id)
            .bind(starts)
            .bind(ends)
            .bind(exclude)
            .fetch_all(&mut *conn)
            .await;
        timer.record();
        result
    }

    /// Insert an OPEN slot unless an exclusion constraint rejects it.
    ///
    /// Returns `None` when a concurrent writer claimed the interval first.
    pub async fn insert_open(
        conn: &mut PgConnection,
        advisor_id: Uuid,
        service_id: Uuid,
        resource_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<Option<SlotEntity>, sqlx::Error> {
        let timer = QueryTimer::new("insert_open_slot");
        let result = sqlx::query_as::<_, SlotEntity>(
            r#"
            INSERT INTO slots (advisor_id, service_id, resource_id, start_time, end_time, state, notes)
            VALUES ($1, $2, $3, $4, $5, 'OPEN', $6)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(advisor_id)
        .bind(service_id)
        .bind(resource_id)
        .bind(start_time)
        .bind(end_time)
        .bind(notes)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Set a slot's state.
    pub async fn update_state(
        conn: &mut PgConnection,
        id: Uuid,
        state: SlotStateDb,
    ) -> Result<SlotEntity, sqlx::Error> {
        let timer = QueryTimer::new("update_slot_state");
        let result = sqlx::query_as::<_, SlotEntity>(
            r#"
            UPDATE slots SET state = $2, updated_at = NOW()
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

    /// Move a slot and optionally replace its notes.
    pub async fn update_schedule(
        conn: &mut PgConnection,
        id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<SlotEntity, sqlx::Error> {
        let timer = QueryTimer::new("update_slot_schedule");
        let result = sqlx::query_as::<_, SlotEntity>(
            r#"
            UPDATE slots SET
                start_time = $2,
                end_time = $3,
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(start_time)
        .bind(end_time)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Remove a slot row.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_slot");
        let result = sqlx::query(
            r#"
            DELETE FROM slots WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }
}
