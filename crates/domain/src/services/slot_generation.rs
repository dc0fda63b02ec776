//! Expansion of advisor rules into fixed-length slot candidates.

use chrono::{Duration, Utc};
use chrono_tz::Tz;

use shared::time::{combine, parse_wall_clock};

use crate::errors::SchedulingError;
use crate::models::{SlotRule, TimeRange};

/// Window covered by a single dated rule, with the rule's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleWindow {
    pub rule_index: usize,
    pub range: TimeRange,
}

/// Resolves one rule into its absolute window.
///
/// Returns `Ok(None)` for rules without a date.
pub fn rule_window(rule: &SlotRule, tz: Tz) -> Result<Option<TimeRange>, SchedulingError> {
    let Some(date) = rule.date else {
        return Ok(None);
    };

    let start_wall = parse_wall_clock(&rule.start_time)?;
    let end_wall = parse_wall_clock(&rule.end_time)?;
    if end_wall <= start_wall {
        return Err(SchedulingError::validation(format!(
            "Rule on {date} ends at {} which is not after {}",
            rule.end_time, rule.start_time
        )));
    }

    let start = combine(date, start_wall, tz)?;
    let end = combine(date, end_wall, tz)?;
    if end <= start {
        return Err(SchedulingError::validation(format!(
            "Rule on {date} collapses to an empty interval in {tz}"
        )));
    }

    Ok(Some(TimeRange::new(start.with_timezone(&Utc), end.with_timezone(&Utc))))
}

/// Resolves every dated rule, keeping the rule index for reporting.
pub fn rule_windows(rules: &[SlotRule], tz: Tz) -> Result<Vec<RuleWindow>, SchedulingError> {
    let mut windows = Vec::with_capacity(rules.len());
    for (rule_index, rule) in rules.iter().enumerate() {
        if let Some(range) = rule_window(rule, tz)? {
            windows.push(RuleWindow { rule_index, range });
        }
    }
    Ok(windows)
}

/// Cuts a window into `[start + k·d, start + (k+1)·d)` segments.
///
/// The trailing remainder shorter than `d` is dropped.
pub fn segment(window: TimeRange, duration_minutes: i64) -> Result<Vec<TimeRange>, SchedulingError> {
    if duration_minutes <= 0 {
        return Err(SchedulingError::validation(
            "Service duration must be a positive number of minutes",
        ));
    }

    let step = Duration::minutes(duration_minutes);
    let mut segments = Vec::new();
    let mut start = window.start;
    loop {
        let end = start + step;
        if end > window.end {
            break;
        }
        if end <= start {
            return Err(SchedulingError::validation("Segment end is not after its start"));
        }
        segments.push(TimeRange::new(start, end));
        start = end;
    }
    Ok(segments)
}

/// Builds the sorted candidate set for a request.
///
/// Candidates from different rules must not overlap each other.
pub fn generate_candidates(
    rules: &[SlotRule],
    tz: Tz,
    duration_minutes: i64,
) -> Result<Vec<TimeRange>, SchedulingError> {
    let mut candidates = Vec::new();
    for window in rule_windows(rules, tz)? {
        candidates.extend(segment(window.range, duration_minutes)?);
    }

    candidates.sort();
    if let Some(pair) = candidates.windows(2).find(|pair| pair[0].overlaps(&pair[1])) {
        return Err(SchedulingError::validation(format!(
            "Rules overlap between {} and {}",
            pair[1].start.to_rfc3339(),
            pair[0].end.to_rfc3339()
        )));
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use chrono_tz::America::{La_Paz, New_York};

    use crate::errors::ErrorKind;

    fn rule(date: &str, start: &str, end: &str) -> SlotRule {
        SlotRule {
            date: Some(date.parse::<NaiveDate>().unwrap()),
            day: None,
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    fn local(h: u32, m: u32) -> chrono::DateTime<Utc> {
        La_Paz
            .with_ymd_and_hms(2025, 9, 1, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_simple_open_produces_three_segments() {
        let candidates =
            generate_candidates(&[rule("2025-09-01", "09:00", "10:30")], La_Paz, 30).unwrap();

        let ends: Vec<_> = candidates.iter().map(|c| c.end).collect();
        assert_eq!(ends, vec![local(9, 30), local(10, 0), local(10, 30)]);
        assert_eq!(candidates[0].start, local(9, 0));
        assert_eq!(candidates[0].start, Utc.with_ymd_and_hms(2025, 9, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_remainder_is_dropped() {
        let candidates =
            generate_candidates(&[rule("2025-09-01", "09:00", "10:10")], La_Paz, 30).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].end, local(10, 0));
    }

    #[test]
    fn test_window_shorter_than_duration_is_empty() {
        let candidates =
            generate_candidates(&[rule("2025-09-01", "09:00", "09:20")], La_Paz, 30).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_dateless_rules_are_ignored() {
        let weekly = SlotRule {
            date: None,
            day: Some("monday".into()),
            start_time: "09:00".into(),
            end_time: "10:00".into(),
        };
        assert!(generate_candidates(&[weekly], La_Paz, 30).unwrap().is_empty());
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let err = generate_candidates(&[rule("2025-09-01", "10:00", "09:00")], La_Paz, 30)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = generate_candidates(&[rule("2025-09-01", "10:00", "10:00")], La_Paz, 30)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_non_positive_duration_is_rejected() {
        let err = generate_candidates(&[rule("2025-09-01", "09:00", "10:00")], La_Paz, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_overlapping_rules_are_rejected() {
        let rules = [
            rule("2025-09-01", "09:00", "10:00"),
            rule("2025-09-01", "09:30", "10:30"),
        ];
        let err = generate_candidates(&rules, La_Paz, 30).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_adjacent_rules_are_accepted() {
        let rules = [
            rule("2025-09-01", "10:00", "11:00"),
            rule("2025-09-01", "09:00", "10:00"),
        ];
        let candidates = generate_candidates(&rules, La_Paz, 30).unwrap();
        assert_eq!(candidates.len(), 4);
        assert!(candidates.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_spring_forward_gap_is_rejected() {
        let err = generate_candidates(&[rule("2025-03-09", "02:30", "04:00")], New_York, 30)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_fall_back_uses_absolute_arithmetic() {
        // 01:00 is ambiguous and resolves to EDT; 02:00 is EST, two hours later.
        let candidates =
            generate_candidates(&[rule("2025-11-02", "01:00", "02:00")], New_York, 60).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].start,
            Utc.with_ymd_and_hms(2025, 11, 2, 5, 0, 0).unwrap()
        );
        assert_eq!(
            candidates[1].end,
            Utc.with_ymd_and_hms(2025, 11, 2, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_rule_windows_keep_rule_index() {
        let rules = [
            SlotRule {
                date: None,
                day: Some("friday".into()),
                start_time: "08:00".into(),
                end_time: "09:00".into(),
            },
            rule("2025-09-01", "09:00", "10:00"),
        ];
        let windows = rule_windows(&rules, La_Paz).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].rule_index, 1);
        assert_eq!(windows[0].range.duration_minutes(), 60);
    }
}
