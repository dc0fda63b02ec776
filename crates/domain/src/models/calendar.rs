//! Calendar provider models.

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use shared::validation::validate_timezone;

use super::slot::SlotRule;

/// Provider tag stored on links and identities.
pub const CALENDAR_PROVIDER_GOOGLE: &str = "google";

/// An attendee's RSVP on a provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendeeResponse {
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
}

impl AttendeeResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendeeResponse::Accepted => "accepted",
            AttendeeResponse::Declined => "declined",
            AttendeeResponse::Tentative => "tentative",
            AttendeeResponse::NeedsAction => "needsAction",
        }
    }

    /// Parses a provider `responseStatus`; unknown values read as `needsAction`.
    pub fn from_provider(value: &str) -> Self {
        match value {
            "accepted" => AttendeeResponse::Accepted,
            "declined" => AttendeeResponse::Declined,
            "tentative" => AttendeeResponse::Tentative,
            _ => AttendeeResponse::NeedsAction,
        }
    }
}

impl std::fmt::Display for AttendeeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whose credentials and calendar an attendee patch goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActingAs {
    /// Patch the event on the organizer's calendar.
    Organizer,
    /// Patch the attendee's own copy on their primary calendar.
    Attendee,
}

/// Event to create on the organizer's calendar.
#[derive(Debug, Clone)]
pub struct NewCalendarEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: Tz,
    pub attendees: Vec<String>,
    pub create_meet_link: bool,
}

/// Provider reply to an event creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEvent {
    pub provider_event_id: String,
    pub html_link: Option<String>,
}

/// Attendee entry on a fetched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAttendee {
    pub email: String,
    pub response_status: AttendeeResponse,
    pub organizer: bool,
    pub is_self: bool,
}

/// Event as fetched from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    pub id: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub html_link: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub attendees: Vec<RemoteAttendee>,
}

impl RemoteEvent {
    /// Cancelled events are reported by the provider instead of a 404 in
    /// some listings.
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    /// Looks up an attendee's response by email, case-insensitively.
    pub fn attendee_response(&self, email: &str) -> Option<AttendeeResponse> {
        self.attendees
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .map(|a| a.response_status)
    }
}

/// Parameters of a push channel on the primary calendar.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    pub channel_id: Uuid,
    pub callback_url: String,
    pub token: String,
    pub ttl_secs: i64,
}

/// Provider reply to a watch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    pub resource_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Stored association of an appointment with a provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarLink {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub identity_id: Uuid,
    pub provider: String,
    pub provider_event_id: String,
    pub html_link: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Request to list remote events clashing with prospective rules.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckConflictsRequest {
    #[validate(
        length(min = 1, max = 200, message = "Between 1 and 200 rules are required"),
        nested
    )]
    pub rules: Vec<SlotRule>,
    #[validate(custom(function = "validate_timezone"))]
    pub timezone: Option<String>,
}

/// A remote event overlapping one of the requested rules.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConflict {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    /// Index of the first rule the event overlaps.
    pub rule_index: usize,
}

/// Response for conflict checks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConflictsResponse {
    pub conflicts: Vec<CalendarConflict>,
}

/// Outcome counters of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub examined: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub reaccepted: usize,
    pub links_removed: usize,
    pub failed: usize,
}
