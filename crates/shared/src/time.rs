//! Wall-clock and civil timezone helpers.
//!
//! Business times are entered as a date plus `HH:MM` in a named IANA zone and
//! stored as UTC instants. All conversions go through [`combine`].

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Error type for time parsing and zone arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid wall-clock time '{0}', expected HH:MM")]
    InvalidWallClock(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("{0} does not exist in {1}")]
    NonexistentLocalTime(NaiveDateTime, Tz),
}

/// Source of "now" for business decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Parses an IANA timezone name such as `America/Mexico_City`.
pub fn parse_timezone(name: &str) -> Result<Tz, TimeError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimeError::UnknownTimezone(name.to_string()))
}

/// Parses a strict `HH:MM` wall-clock time.
pub fn parse_wall_clock(value: &str) -> Result<NaiveTime, TimeError> {
    let trimmed = value.trim();
    if trimmed.len() != 5 {
        return Err(TimeError::InvalidWallClock(value.to_string()));
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .map_err(|_| TimeError::InvalidWallClock(value.to_string()))
}

/// Parses an ISO `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate, TimeError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| TimeError::InvalidDate(value.to_string()))
}

/// Combines a civil date and wall-clock time into a zone-aware instant.
///
/// A wall clock skipped by a forward transition is an error. A wall clock
/// repeated by a backward transition resolves to the earlier instant.
pub fn combine(date: NaiveDate, time: NaiveTime, tz: Tz) -> Result<DateTime<Tz>, TimeError> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or(TimeError::NonexistentLocalTime(naive, tz))
}

/// Returns `[start of from, start of the day after to)` as UTC instants.
pub fn date_range_bounds(
    from: NaiveDate,
    to: NaiveDate,
    tz: Tz,
) -> Result<(DateTime<Utc>, DateTime<Utc>), TimeError> {
    let start = start_of_day(from, tz)?;
    let end = start_of_day(to + Duration::days(1), tz)?;
    Ok((start, end))
}

fn start_of_day(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, TimeError> {
    // Some zones skip midnight; the first valid minute of the day is used then.
    let mut minute = NaiveTime::MIN;
    for _ in 0..=120 {
        if let Ok(dt) = combine(date, minute, tz) {
            return Ok(dt.with_timezone(&Utc));
        }
        minute += Duration::minutes(1);
    }
    Err(TimeError::NonexistentLocalTime(date.and_time(NaiveTime::MIN), tz))
}
