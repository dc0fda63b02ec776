//! Typed errors of the scheduling core.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use shared::time::TimeError;

use crate::models::SlotInterval;

/// Stable error codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    NoAdvisorProfile,
    ServiceNotAssigned,
    ForbiddenRole,
    StateForbidden,
    SlotNotAvailable,
    ResourceBusy,
    AdvisorTimeClash,
    OauthRevoked,
    UpstreamTimeout,
    UpstreamTransient,
    UpstreamPermanent,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::NoAdvisorProfile => "NO_ADVISOR_PROFILE",
            ErrorKind::ServiceNotAssigned => "SERVICE_NOT_ASSIGNED",
            ErrorKind::ForbiddenRole => "FORBIDDEN_ROLE",
            ErrorKind::StateForbidden => "STATE_FORBIDDEN",
            ErrorKind::SlotNotAvailable => "SLOT_NOT_AVAILABLE",
            ErrorKind::ResourceBusy => "RESOURCE_BUSY",
            ErrorKind::AdvisorTimeClash => "ADVISOR_TIME_CLASH",
            ErrorKind::OauthRevoked => "OAUTH_REVOKED",
            ErrorKind::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ErrorKind::UpstreamTransient => "UPSTREAM_TRANSIENT",
            ErrorKind::UpstreamPermanent => "UPSTREAM_PERMANENT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the calendar provider adapter and the token vault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("User {0} has no connected calendar")]
    NotConnected(Uuid),

    #[error("Calendar authorization was revoked")]
    OAuthRevoked,

    #[error("Calendar resource not found")]
    NotFound,

    #[error("Calendar provider timed out")]
    Timeout,

    #[error("Calendar provider unavailable: {0}")]
    Transient(String),

    #[error("Calendar provider rejected the request ({status}): {body}")]
    Permanent { status: u16, body: String },

    #[error("Calendar credential storage failed: {0}")]
    Storage(String),
}

impl CalendarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalendarError::NotConnected(_) | CalendarError::OAuthRevoked => ErrorKind::OauthRevoked,
            CalendarError::NotFound => ErrorKind::NotFound,
            CalendarError::Timeout => ErrorKind::UpstreamTimeout,
            CalendarError::Transient(_) => ErrorKind::UpstreamTransient,
            CalendarError::Permanent { .. } => ErrorKind::UpstreamPermanent,
            CalendarError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Maps a provider HTTP status to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 | 410 => CalendarError::NotFound,
            408 | 429 | 500..=599 => CalendarError::Transient(format!("status {status}")),
            _ => CalendarError::Permanent { status, body },
        }
    }
}

/// Error type for every scheduling operation.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("User {0} has no advisor profile")]
    NoAdvisorProfile(Uuid),

    #[error("Advisor is not assigned to service {0}")]
    ServiceNotAssigned(Uuid),

    #[error("{0}")]
    ForbiddenRole(String),

    #[error("Slot {0} is not available")]
    SlotNotAvailable(Uuid),

    #[error("Cannot {operation}: {detail}")]
    StateForbidden {
        operation: &'static str,
        detail: String,
    },

    #[error("Resource is busy: {} conflicting slot(s)", .0.len())]
    ResourceBusy(Vec<SlotInterval>),

    #[error("Advisor already has {} overlapping slot(s)", .0.len())]
    AdvisorTimeClash(Vec<SlotInterval>),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SchedulingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulingError::Validation(_) => ErrorKind::Validation,
            SchedulingError::NotFound(_) => ErrorKind::NotFound,
            SchedulingError::NoAdvisorProfile(_) => ErrorKind::NoAdvisorProfile,
            SchedulingError::ServiceNotAssigned(_) => ErrorKind::ServiceNotAssigned,
            SchedulingError::ForbiddenRole(_) => ErrorKind::ForbiddenRole,
            SchedulingError::SlotNotAvailable(_) => ErrorKind::SlotNotAvailable,
            SchedulingError::StateForbidden { .. } => ErrorKind::StateForbidden,
            SchedulingError::ResourceBusy(_) => ErrorKind::ResourceBusy,
            SchedulingError::AdvisorTimeClash(_) => ErrorKind::AdvisorTimeClash,
            SchedulingError::Calendar(e) => e.kind(),
            SchedulingError::Database(_) | SchedulingError::Configuration(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Structured details for callers, currently the conflict list.
    pub fn extra(&self) -> Option<serde_json::Value> {
        match self {
            SchedulingError::ResourceBusy(conflicts) | SchedulingError::AdvisorTimeClash(conflicts) => {
                Some(serde_json::json!({ "conflicts": conflicts }))
            }
            _ => None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SchedulingError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        SchedulingError::ForbiddenRole(message.into())
    }
}

impl From<sqlx::Error> for SchedulingError {
    fn from(err: sqlx::Error) -> Self {
        SchedulingError::Database(err.to_string())
    }
}

impl From<TimeError> for SchedulingError {
    fn from(err: TimeError) -> Self {
        SchedulingError::Validation(err.to_string())
    }
}

/// SQLSTATE of an exclusion constraint violation.
pub const EXCLUSION_VIOLATION: &str = "23P01";
/// SQLSTATE of a unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Returns true when `err` is a database error with the given SQLSTATE.
pub fn has_sqlstate(err: &sqlx::Error, code: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(code),
        _ => false,
    }
}

/// Exclusion constraint that keeps one advisor's active slots apart.
pub const ADVISOR_OVERLAP_CONSTRAINT: &str = "slots_no_advisor_overlap";

/// Conflict error for an exclusion violation, chosen by the constraint name.
pub fn overlap_violation(constraint: Option<&str>) -> SchedulingError {
    match constraint {
        Some(ADVISOR_OVERLAP_CONSTRAINT) => SchedulingError::AdvisorTimeClash(Vec::new()),
        _ => SchedulingError::ResourceBusy(Vec::new()),
    }
}

/// Maps an exclusion violation to its conflict error; other errors pass through.
pub fn exclusion_conflict(err: sqlx::Error) -> SchedulingError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(EXCLUSION_VIOLATION) => {
            overlap_violation(db.constraint())
        }
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SchedulingError::SlotNotAvailable(Uuid::nil()).kind(),
            ErrorKind::SlotNotAvailable
        );
        assert_eq!(
            SchedulingError::from(CalendarError::NotConnected(Uuid::nil())).kind(),
            ErrorKind::OauthRevoked
        );
        assert_eq!(
            SchedulingError::Database("boom".into()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(ErrorKind::AdvisorTimeClash.to_string(), "ADVISOR_TIME_CLASH");
        assert_eq!(
            serde_json::to_string(&ErrorKind::OauthRevoked).unwrap(),
            "\"OAUTH_REVOKED\""
        );
    }

    #[test]
    fn test_overlap_violation_follows_constraint() {
        assert_eq!(
            overlap_violation(Some("slots_no_advisor_overlap")).kind(),
            ErrorKind::AdvisorTimeClash
        );
        assert_eq!(
            overlap_violation(Some("slots_no_resource_overlap")).kind(),
            ErrorKind::ResourceBusy
        );
        assert_eq!(overlap_violation(None).kind(), ErrorKind::ResourceBusy);
    }

    #[test]
    fn test_exclusion_conflict_passes_other_errors_through() {
        assert_eq!(
            exclusion_conflict(sqlx::Error::RowNotFound).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_calendar_status_mapping() {
        assert_eq!(CalendarError::from_status(404, String::new()), CalendarError::NotFound);
        assert_eq!(CalendarError::from_status(410, String::new()), CalendarError::NotFound);
        assert_eq!(
            CalendarError::from_status(503, String::new()).kind(),
            ErrorKind::UpstreamTransient
        );
        assert_eq!(
            CalendarError::from_status(429, String::new()).kind(),
            ErrorKind::UpstreamTransient
        );
        assert_eq!(
            CalendarError::from_status(400, "bad".into()),
            CalendarError::Permanent {
                status: 400,
                body: "bad".into()
            }
        );
    }

    #[test]
    fn test_conflict_extra_lists_intervals() {
        let slot_id = Uuid::new_v4();
        let start = Utc.with_ymd_and_hms(2025, 9, 1, 13, 0, 0).unwrap();
        let err = SchedulingError::ResourceBusy(vec![SlotInterval {
            slot_id,
            start,
            end: start + chrono::Duration::minutes(30),
        }]);

        let extra = err.extra().unwrap();
        assert_eq!(extra["conflicts"][0]["slotId"], slot_id.to_string());
        assert_eq!(err.to_string(), "Resource is busy: 1 conflicting slot(s)");
        assert!(SchedulingError::validation("x").extra().is_none());
    }

    #[test]
    fn test_time_error_is_validation() {
        let err: SchedulingError = TimeError::UnknownTimezone("Mars/Base".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
