//! Interval conflict logic shared by slot generation and slot edits.
//!
//! The store returns the claiming slots near the candidates; this module
//! decides which candidates they block and which error a strict request gets.

use crate::errors::SchedulingError;
use crate::models::{SlotInterval, TimeRange};

/// Existing intervals that overlap at least one candidate, deduplicated and
/// ordered by start.
pub fn conflicts_for(candidates: &[TimeRange], existing: &[SlotInterval]) -> Vec<SlotInterval> {
    let mut hits: Vec<SlotInterval> = existing
        .iter()
        .filter(|e| candidates.iter().any(|c| c.overlaps(&e.range())))
        .cloned()
        .collect();
    hits.sort_by_key(|e| (e.start, e.slot_id));
    hits.dedup_by_key(|e| e.slot_id);
    hits
}

/// Returns true if `candidate` overlaps any blocker.
pub fn is_blocked(candidate: &TimeRange, blockers: &[SlotInterval]) -> bool {
    blockers.iter().any(|b| candidate.overlaps(&b.range()))
}

/// Candidates split into writable and blocked ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub accepted: Vec<TimeRange>,
    pub skipped: Vec<TimeRange>,
}

/// Splits candidates by whether any blocker overlaps them.
pub fn partition(candidates: Vec<TimeRange>, blockers: &[SlotInterval]) -> Partition {
    let (skipped, accepted) = candidates
        .into_iter()
        .partition(|c| is_blocked(c, blockers));
    Partition { accepted, skipped }
}

/// Applies the `allowConflicts` policy.
///
/// Strict requests fail on the first kind of conflict found, resource before
/// advisor. Permissive requests drop blocked candidates.
pub fn apply_policy(
    candidates: Vec<TimeRange>,
    resource_conflicts: &[SlotInterval],
    advisor_conflicts: &[SlotInterval],
    allow_conflicts: bool,
) -> Result<Partition, SchedulingError> {
    if !allow_conflicts {
        let resource_hits = conflicts_for(&candidates, resource_conflicts);
        if !resource_hits.is_empty() {
            return Err(SchedulingError::ResourceBusy(resource_hits));
        }
        let advisor_hits = conflicts_for(&candidates, advisor_conflicts);
        if !advisor_hits.is_empty() {
            return Err(SchedulingError::AdvisorTimeClash(advisor_hits));
        }
        return Ok(Partition {
            accepted: candidates,
            skipped: Vec::new(),
        });
    }

    let blockers: Vec<SlotInterval> = resource_conflicts
        .iter()
        .chain(advisor_conflicts.iter())
        .cloned()
        .collect();
    Ok(partition(candidates, &blockers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    use crate::errors::ErrorKind;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, h, m, 0).unwrap()
    }

    fn range(h1: u32, m1: u32, h2: u32, m2: u32) -> TimeRange {
        TimeRange::new(at(h1, m1), at(h2, m2))
    }

    fn existing(h1: u32, m1: u32, h2: u32, m2: u32) -> SlotInterval {
        SlotInterval {
            slot_id: Uuid::new_v4(),
            start: at(h1, m1),
            end: at(h2, m2),
        }
    }

    #[test]
    fn test_strict_resource_conflict_lists_blocker() {
        let blocker = existing(13, 0, 13, 30);
        let candidates = vec![range(13, 0, 13, 30), range(13, 30, 14, 0)];

        let err = apply_policy(candidates, &[blocker.clone()], &[], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceBusy);
        match err {
            SchedulingError::ResourceBusy(conflicts) => assert_eq!(conflicts, vec![blocker]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_permissive_skips_blocked_candidates() {
        let blocker = existing(13, 0, 13, 30);
        let candidates = vec![range(13, 0, 13, 30), range(13, 30, 14, 0)];

        let result = apply_policy(candidates, &[blocker], &[], true).unwrap();
        assert_eq!(result.accepted, vec![range(13, 30, 14, 0)]);
        assert_eq!(result.skipped.len(), 1);
    }

    #[test]
    fn test_resource_conflict_reported_before_advisor() {
        let candidates = vec![range(13, 0, 13, 30)];
        let err = apply_policy(
            candidates,
            &[existing(13, 0, 13, 30)],
            &[existing(13, 15, 13, 45)],
            false,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceBusy);
    }

    #[test]
    fn test_advisor_clash() {
        let candidates = vec![range(13, 0, 13, 30)];
        let err = apply_policy(candidates, &[], &[existing(13, 15, 13, 45)], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdvisorTimeClash);
    }

    #[test]
    fn test_touching_intervals_do_not_conflict() {
        let candidates = vec![range(13, 30, 14, 0)];
        let result = apply_policy(candidates, &[existing(13, 0, 13, 30)], &[], false).unwrap();
        assert_eq!(result.accepted.len(), 1);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_conflicts_are_deduplicated() {
        let blocker = existing(13, 0, 14, 0);
        let candidates = vec![range(13, 0, 13, 30), range(13, 30, 14, 0)];
        assert_eq!(conflicts_for(&candidates, &[blocker.clone(), blocker]).len(), 1);
    }

    #[test]
    fn test_permissive_equals_filter_then_strict() {
        let resource = vec![existing(13, 0, 13, 30), existing(15, 0, 16, 0)];
        let advisor = vec![existing(14, 15, 14, 45)];
        let candidates: Vec<TimeRange> = (0..8)
            .map(|k| {
                let start = at(13, 0) + chrono::Duration::minutes(30 * k);
                TimeRange::new(start, start + chrono::Duration::minutes(30))
            })
            .collect();

        let permissive = apply_policy(candidates.clone(), &resource, &advisor, true).unwrap();

        let filtered: Vec<TimeRange> = candidates
            .into_iter()
            .filter(|c| !is_blocked(c, &resource) && !is_blocked(c, &advisor))
            .collect();
        let strict = apply_policy(filtered, &resource, &advisor, false).unwrap();

        assert_eq!(permissive.accepted, strict.accepted);
        assert!(strict.skipped.is_empty());
        assert_eq!(permissive.accepted.len() + permissive.skipped.len(), 8);
    }
}
