//! Appointment domain models.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::slot::SlotState;

/// Lifecycle state of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentState {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentState {
    /// Pending and confirmed appointments hold the slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentState::Pending | AppointmentState::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentState::Pending => "PENDING",
            AppointmentState::Confirmed => "CONFIRMED",
            AppointmentState::Cancelled => "CANCELLED",
            AppointmentState::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for AppointmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A teacher's booking against a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub slot_id: Uuid,
    pub state: AppointmentState,
    pub origin: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to reserve a slot.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub slot_id: Uuid,
    #[serde(default = "default_origin")]
    #[validate(regex(
        path = *ORIGIN_TAG_REGEX,
        message = "Origin must be a short lowercase tag"
    ))]
    pub origin: String,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

fn default_origin() -> String {
    "web".to_string()
}

lazy_static::lazy_static! {
    static ref ORIGIN_TAG_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-z][a-z0-9_-]{0,31}$").unwrap();
}

/// Appointment as returned by reserve.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSummary {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub teacher_id: Uuid,
    pub state: AppointmentState,
    pub slot_state: SlotState,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub calendar_synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_html_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of confirm, decline and cancel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub appointment_id: Uuid,
    pub slot_id: Uuid,
    pub appointment_state: AppointmentState,
    pub slot_state: SlotState,
    pub calendar_synced: bool,
    /// Error code of the failed calendar side effect, e.g. `OAUTH_REVOKED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_error: Option<String>,
}

/// Pending appointment row for advisor and teacher inboxes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAppointment {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub state: AppointmentState,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub advisor_id: Uuid,
    pub teacher_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_name: Option<String>,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub created_at: DateTime<Utc>,
}

/// Response for pending lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAppointmentsResponse {
    pub data: Vec<PendingAppointment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appointment_state_serialization() {
        assert_eq!(
            serde_json::to_string(&AppointmentState::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::from_str::<AppointmentState>("\"COMPLETED\"").unwrap(),
            AppointmentState::Completed
        );
        assert_eq!(AppointmentState::Confirmed.to_string(), "CONFIRMED");
    }

    #[test]
    fn test_appointment_state_is_active() {
        assert!(AppointmentState::Pending.is_active());
        assert!(AppointmentState::Confirmed.is_active());
        assert!(!AppointmentState::Cancelled.is_active());
        assert!(!AppointmentState::Completed.is_active());
    }

    #[test]
    fn test_reserve_request_defaults_origin() {
        let json = r#"{"slotId":"00000000-0000-0000-0000-000000000001"}"#;
        let request: ReserveRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.origin, "web");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_reserve_request_origin_tag() {
        let mut request = ReserveRequest {
            slot_id: Uuid::new_v4(),
            origin: "agent".into(),
            notes: None,
        };
        assert!(request.validate().is_ok());

        request.origin = "Agent Bot!".into();
        assert!(request.validate().is_err());

        request.origin = "a".repeat(40);
        assert!(request.validate().is_err());

        request.origin = String::new();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_reserve_request_notes_length() {
        let request = ReserveRequest {
            slot_id: Uuid::new_v4(),
            origin: "web".into(),
            notes: Some("x".repeat(1001)),
        };
        assert!(request.validate().is_err());
    }
}
