//! Slot entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Slot, SlotInterval, SlotState};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for slot_state that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "slot_state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStateDb {
    Open,
    Reserved,
    Cancelled,
    Expired,
    Realized,
}

impl From<SlotStateDb> for SlotState {
    fn from(db: SlotStateDb) -> Self {
        match db {
            SlotStateDb::Open => SlotState::Open,
            SlotStateDb::Reserved => SlotState::Reserved,
            SlotStateDb::Cancelled => SlotState::Cancelled,
            SlotStateDb::Expired => SlotState::Expired,
            SlotStateDb::Realized => SlotState::Realized,
        }
    }
}

impl From<SlotState> for SlotStateDb {
    fn from(state: SlotState) -> Self {
        match state {
            SlotState::Open => SlotStateDb::Open,
            SlotState::Reserved => SlotStateDb::Reserved,
            SlotState::Cancelled => SlotStateDb::Cancelled,
            SlotState::Expired => SlotStateDb::Expired,
            SlotState::Realized => SlotStateDb::Realized,
        }
    }
}

/// Database row mapping for the slots table.
#[derive(Debug, Clone, FromRow)]
pub struct SlotEntity {
    pub id: Uuid,
    pub advisor_id: Uuid,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub state: SlotStateDb,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SlotEntity> for Slot {
    fn from(entity: SlotEntity) -> Self {
        Self {
            id: entity.id,
            advisor_id: entity.advisor_id,
            service_id: entity.service_id,
            resource_id: entity.resource_id,
            start_time: entity.start_time,
            end_time: entity.end_time,
            state: entity.state.into(),
            notes: entity.notes,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Claiming slot returned by conflict queries.
#[derive(Debug, Clone, FromRow)]
pub struct SlotIntervalEntity {
    pub slot_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<SlotIntervalEntity> for SlotInterval {
    fn from(entity: SlotIntervalEntity) -> Self {
        Self {
            slot_id: entity.slot_id,
            start: entity.start_time,
            end: entity.end_time,
        }
    }
}

/// Counts returned by the sweep statement.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct SweepCountsEntity {
    pub expired: i64,
    pub realized: i64,
    pub completed_appointments: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_state_round_trip() {
        for state in [
            SlotState::Open,
            SlotState::Reserved,
            SlotState::Cancelled,
            SlotState::Expired,
            SlotState::Realized,
        ] {
            assert_eq!(SlotState::from(SlotStateDb::from(state)), state);
        }
    }

    #[test]
    fn test_slot_entity_into_domain() {
        let now = Utc::now();
        let entity = SlotEntity {
            id: Uuid::new_v4(),
            advisor_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            resource_id: Uuid::new_v4(),
            start_time: now,
            end_time: now + chrono::Duration::minutes(30),
            state: SlotStateDb::Reserved,
            notes: Some("Traer borrador".into()),
            created_at: now,
            updated_at: now,
        };
        let slot: Slot = entity.clone().into();
        assert_eq!(slot.id, entity.id);
        assert_eq!(slot.state, SlotState::Reserved);
        assert_eq!(slot.range().duration_minutes(), 30);
    }
}
