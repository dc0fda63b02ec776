//! Appointment entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Appointment, AppointmentState};
use sqlx::FromRow;
use uuid::Uuid;

use super::slot::SlotStateDb;

/// Database enum for appointment_state that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "appointment_state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStateDb {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl From<AppointmentStateDb> for AppointmentState {
    fn from(db: AppointmentStateDb) -> Self {
        match db {
            AppointmentStateDb::Pending => AppointmentState::Pending,
            AppointmentStateDb::Confirmed => AppointmentState::Confirmed,
            AppointmentStateDb::Cancelled => AppointmentState::Cancelled,
            AppointmentStateDb::Completed => AppointmentState::Completed,
        }
    }
}

impl From<AppointmentState> for AppointmentStateDb {
    fn from(state: AppointmentState) -> Self {
        match state {
            AppointmentState::Pending => AppointmentStateDb::Pending,
            AppointmentState::Confirmed => AppointmentStateDb::Confirmed,
            AppointmentState::Cancelled => AppointmentStateDb::Cancelled,
            AppointmentState::Completed => AppointmentStateDb::Completed,
        }
    }
}

/// Database row mapping for the appointments table.
#[derive(Debug, Clone, FromRow)]
pub struct AppointmentEntity {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub slot_id: Uuid,
    pub state: AppointmentStateDb,
    pub origin: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AppointmentEntity> for Appointment {
    fn from(entity: AppointmentEntity) -> Self {
        Self {
            id: entity.id,
            teacher_id: entity.teacher_id,
            slot_id: entity.slot_id,
            state: entity.state.into(),
            origin: entity.origin,
            notes: entity.notes,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Pending appointment joined with its slot and counterpart.
#[derive(Debug, Clone, FromRow)]
pub struct PendingAppointmentEntity {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub state: AppointmentStateDb,
    pub origin: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub teacher_id: Uuid,
    pub advisor_id: Uuid,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub counterpart_name: Option<String>,
}

/// Linked appointment visible to a watched user, as read by the reconciler.
#[derive(Debug, Clone, FromRow)]
pub struct ReconcileCandidateEntity {
    pub appointment_id: Uuid,
    pub appointment_state: AppointmentStateDb,
    pub slot_id: Uuid,
    pub slot_state: SlotStateDb,
    pub advisor_user_id: Uuid,
    pub teacher_user_id: Uuid,
    pub teacher_email: String,
    pub link_id: Uuid,
    pub provider_event_id: String,
}

/// Active appointment that has no calendar event yet.
#[derive(Debug, Clone, FromRow)]
pub struct BackfillCandidateEntity {
    pub appointment_id: Uuid,
    pub slot_id: Uuid,
    pub advisor_user_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appointment_state_round_trip() {
        for state in [
            AppointmentState::Pending,
            AppointmentState::Confirmed,
            AppointmentState::Cancelled,
            AppointmentState::Completed,
        ] {
            assert_eq!(AppointmentState::from(AppointmentStateDb::from(state)), state);
        }
    }

    #[test]
    fn test_appointment_entity_into_domain() {
        let now = Utc::now();
        let entity = AppointmentEntity {
            id: Uuid::new_v4(),
            teacher_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            state: AppointmentStateDb::Pending,
            origin: "agent".into(),
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let appointment: Appointment = entity.clone().into();
        assert_eq!(appointment.state, AppointmentState::Pending);
        assert_eq!(appointment.origin, "agent");
        assert_eq!(appointment.slot_id, entity.slot_id);
    }
}
