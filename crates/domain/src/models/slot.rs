//! Slot domain models.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use shared::validation::{validate_timezone, validate_wall_clock};

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotState {
    Open,
    Reserved,
    Cancelled,
    Expired,
    Realized,
}

impl SlotState {
    /// States in which a slot keeps its claim on the resource and advisor.
    pub const CLAIMING: [SlotState; 3] = [SlotState::Open, SlotState::Reserved, SlotState::Cancelled];

    /// Returns true if the slot still occupies its interval.
    pub fn holds_claim(&self) -> bool {
        Self::CLAIMING.contains(self)
    }

    /// Returns true for states reached only by the passage of time.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SlotState::Expired | SlotState::Realized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotState::Open => "OPEN",
            SlotState::Reserved => "RESERVED",
            SlotState::Cancelled => "CANCELLED",
            SlotState::Expired => "EXPIRED",
            SlotState::Realized => "REALIZED",
        }
    }
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Half-open `[start, end)` interval in absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Half-open overlap test; touching intervals do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// A concrete bookable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: Uuid,
    pub advisor_id: Uuid,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub state: SlotState,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// True once the slot's end has passed.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }
}

/// An existing slot that blocks a candidate interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInterval {
    pub slot_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SlotInterval {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// A recurrence rule entered by an advisor.
///
/// Rules without a date describe a weekly prototype and are ignored when
/// materializing slots.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SlotRule {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    #[validate(custom(function = "validate_wall_clock"))]
    pub start_time: String,
    #[validate(custom(function = "validate_wall_clock"))]
    pub end_time: String,
}

/// Request to open slots from rules.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OpenSlotsRequest {
    pub service_id: Uuid,
    pub resource_id: Uuid,
    #[validate(
        length(min = 1, max = 200, message = "Between 1 and 200 rules are required"),
        nested
    )]
    pub rules: Vec<SlotRule>,
    #[validate(custom(function = "validate_timezone"))]
    pub timezone: Option<String>,
    #[serde(default)]
    pub allow_conflicts: bool,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

/// Slot as presented to callers, in the caller's timezone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub id: Uuid,
    pub advisor_id: Uuid,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub state: SlotState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SlotSummary {
    pub fn from_slot(slot: &Slot, tz: Tz) -> Self {
        Self {
            id: slot.id,
            advisor_id: slot.advisor_id,
            service_id: slot.service_id,
            resource_id: slot.resource_id,
            start: slot.start_time.with_timezone(&tz).fixed_offset(),
            end: slot.end_time.with_timezone(&tz).fixed_offset(),
            state: slot.state,
            notes: slot.notes.clone(),
        }
    }
}

/// Result of opening slots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSlotsResponse {
    pub created_slots: usize,
    pub skipped: usize,
    pub slots: Vec<SlotSummary>,
}

/// Filters for searching open slots.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FindSlotsQuery {
    pub service_id: Option<Uuid>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub campus_id: Option<Uuid>,
    pub building_id: Option<Uuid>,
    pub resource_id: Option<Uuid>,
    #[validate(custom(function = "validate_timezone"))]
    pub timezone: Option<String>,
}

/// Response for slot searches.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindSlotsResponse {
    pub data: Vec<SlotSummary>,
}

/// Patch for an OPEN slot.
///
/// `date` and `startTime` move the slot; the end follows from the service
/// duration.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EditSlotRequest {
    pub date: Option<NaiveDate>,
    #[validate(custom(function = "validate_wall_clock"))]
    pub start_time: Option<String>,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
    #[validate(custom(function = "validate_timezone"))]
    pub timezone: Option<String>,
}

impl EditSlotRequest {
    pub fn moves_slot(&self) -> bool {
        self.date.is_some() || self.start_time.is_some()
    }
}

/// Counts returned by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub expired: i64,
    pub realized: i64,
    pub completed_appointments: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_slot_state_serialization() {
        assert_eq!(serde_json::to_string(&SlotState::Open).unwrap(), "\"OPEN\"");
        assert_eq!(
            serde_json::from_str::<SlotState>("\"REALIZED\"").unwrap(),
            SlotState::Realized
        );
        assert_eq!(SlotState::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_slot_state_claims() {
        assert!(SlotState::Open.holds_claim());
        assert!(SlotState::Reserved.holds_claim());
        assert!(SlotState::Cancelled.holds_claim());
        assert!(!SlotState::Expired.holds_claim());
        assert!(!SlotState::Realized.holds_claim());
        assert!(SlotState::Expired.is_terminal());
        assert!(!SlotState::Open.is_terminal());
    }

    #[test]
    fn test_time_range_half_open() {
        let a = TimeRange::new(at(9, 0), at(9, 30));
        let b = TimeRange::new(at(9, 30), at(10, 0));
        let c = TimeRange::new(at(9, 15), at(9, 45));

        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
        assert_eq!(a.duration_minutes(), 30);
    }

    #[test]
    fn test_slot_rule_deserialization() {
        let json = r#"{"date":"2025-09-01","startTime":"09:00","endTime":"10:30"}"#;
        let rule: SlotRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.date, NaiveDate::from_ymd_opt(2025, 9, 1));
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_slot_rule_rejects_bad_time() {
        let rule = SlotRule {
            date: None,
            day: Some("monday".into()),
            start_time: "9am".into(),
            end_time: "10:00".into(),
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_open_slots_request_validation() {
        let json = r#"{
            "serviceId": "00000000-0000-0000-0000-000000000001",
            "resourceId": "00000000-0000-0000-0000-000000000002",
            "rules": [],
            "timezone": "America/La_Paz"
        }"#;
        let request: OpenSlotsRequest = serde_json::from_str(json).unwrap();
        assert!(!request.allow_conflicts);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_open_slots_request_nested_rule_validation() {
        let json = r#"{
            "serviceId": "00000000-0000-0000-0000-000000000001",
            "resourceId": "00000000-0000-0000-0000-000000000002",
            "rules": [{"date":"2025-09-01","startTime":"09:00","endTime":"25:00"}],
            "allowConflicts": true
        }"#;
        let request: OpenSlotsRequest = serde_json::from_str(json).unwrap();
        assert!(request.allow_conflicts);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_slot_summary_uses_request_timezone() {
        let slot = Slot {
            id: Uuid::new_v4(),
            advisor_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            resource_id: Uuid::new_v4(),
            start_time: at(13, 0),
            end_time: at(13, 30),
            state: SlotState::Open,
            notes: None,
            created_at: at(0, 0),
            updated_at: at(0, 0),
        };
        let summary = SlotSummary::from_slot(&slot, chrono_tz::America::La_Paz);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["start"], "2025-09-01T09:00:00-04:00");
        assert_eq!(json["end"], "2025-09-01T09:30:00-04:00");
        assert_eq!(json["state"], "OPEN");
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn test_edit_slot_request_moves() {
        assert!(!EditSlotRequest::default().moves_slot());
        let patch = EditSlotRequest {
            start_time: Some("10:00".into()),
            ..Default::default()
        };
        assert!(patch.moves_slot());
    }
}
