//! Common validation utilities.

use chrono::NaiveDate;
use validator::ValidationError;

use crate::time::{parse_timezone, parse_wall_clock};

/// Maximum span accepted by slot searches, in days.
pub const MAX_SEARCH_RANGE_DAYS: i64 = 92;

/// Validates a `HH:MM` wall-clock string.
pub fn validate_wall_clock(value: &str) -> Result<(), ValidationError> {
    parse_wall_clock(value).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("wall_clock_format");
        err.message = Some("Time must use the HH:MM format".into());
        err
    })
}

/// Validates an IANA timezone name.
pub fn validate_timezone(value: &str) -> Result<(), ValidationError> {
    parse_timezone(value).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("timezone_unknown");
        err.message = Some("Unknown timezone".into());
        err
    })
}

/// Validates that a date range is ordered and not wider than the search limit.
pub fn validate_date_range(from: NaiveDate, to: NaiveDate) -> Result<(), ValidationError> {
    if from > to {
        let mut err = ValidationError::new("date_range_order");
        err.message = Some("fromDate must not be after toDate".into());
        return Err(err);
    }
    if (to - from).num_days() > MAX_SEARCH_RANGE_DAYS {
        let mut err = ValidationError::new("date_range_width");
        err.message = Some(format!("Date range cannot exceed {MAX_SEARCH_RANGE_DAYS} days").into());
        return Err(err);
    }
    Ok(())
}
