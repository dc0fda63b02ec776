//! Slot generation, search and calendar conflict preview.

use std::sync::Arc;

use chrono_tz::Tz;
use domain::models::{
    AdvisorProfile, CalendarConflict, CheckConflictsRequest, CheckConflictsResponse,
    FindSlotsQuery, FindSlotsResponse, OpenSlotsRequest, OpenSlotsResponse, Resource, Service,
    Slot, SlotInterval, SlotSummary, TimeRange,
};
use domain::services::{apply_policy, generate_candidates, rule_windows, CalendarGateway};
use domain::SchedulingError;
use persistence::repositories::{CatalogRepository, ClaimScope, OpenSlotFilter, SlotRepository};
use shared::time::{date_range_bounds, Clock};
use shared::validation::validate_date_range;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use super::resolve_timezone;
use crate::middleware::metrics::record_slots_opened;

/// Opens slots from advisor rules and answers slot searches.
pub struct SlotGenerator {
    pool: PgPool,
    catalog: CatalogRepository,
    slots: SlotRepository,
    calendar: Arc<dyn CalendarGateway>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    search_limit: i64,
}

impl SlotGenerator {
    pub fn new(
        pool: PgPool,
        calendar: Arc<dyn CalendarGateway>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
        search_limit: i64,
    ) -> Self {
        Self {
            catalog: CatalogRepository::new(pool.clone()),
            slots: SlotRepository::new(pool.clone()),
            pool,
            calendar,
            clock,
            timezone,
            search_limit,
        }
    }

    /// Materializes rules into OPEN slots under the `allowConflicts` policy.
    pub async fn open_slots(
        &self,
        user_id: Uuid,
        request: OpenSlotsRequest,
    ) -> Result<OpenSlotsResponse, SchedulingError> {
        let advisor = active_advisor(&self.catalog, user_id).await?;

        let service = self
            .catalog
            .find_service(request.service_id)
            .await?
            .map(Service::from)
            .filter(Service::is_schedulable)
            .ok_or_else(|| {
                SchedulingError::validation(format!(
                    "Service {} is unknown or inactive",
                    request.service_id
                ))
            })?;
        if !self.catalog.advisor_has_service(advisor.id, service.id).await? {
            return Err(SchedulingError::ServiceNotAssigned(service.id));
        }

        let resource = self
            .catalog
            .find_resource(request.resource_id)
            .await?
            .map(Resource::from)
            .filter(|r| r.active)
            .ok_or_else(|| {
                SchedulingError::validation(format!(
                    "Resource {} is unknown or inactive",
                    request.resource_id
                ))
            })?;

        let tz = resolve_timezone(request.timezone.as_deref(), self.timezone)?;
        let candidates =
            generate_candidates(&request.rules, tz, i64::from(service.duration_minutes))?;
        if candidates.is_empty() {
            return Ok(OpenSlotsResponse {
                created_slots: 0,
                skipped: 0,
                slots: Vec::new(),
            });
        }

        let mut tx = self.pool.begin().await?;

        let resource_conflicts =
            claims(&mut *tx, ClaimScope::Resource, resource.id, &candidates, None).await?;
        let advisor_conflicts =
            claims(&mut *tx, ClaimScope::Advisor, advisor.id, &candidates, None).await?;
        let partition = apply_policy(
            candidates,
            &resource_conflicts,
            &advisor_conflicts,
            request.allow_conflicts,
        )?;

        let mut skipped = partition.skipped.len();
        let mut created = Vec::with_capacity(partition.accepted.len());
        for candidate in partition.accepted {
            let inserted = SlotRepository::insert_open(
                &mut *tx,
                advisor.id,
                service.id,
                resource.id,
                candidate.start,
                candidate.end,
                request.notes.as_deref(),
            )
            .await?;
            match inserted {
                Some(slot) => created.push(Slot::from(slot)),
                None => skipped += 1,
            }
        }

        tx.commit().await?;

        record_slots_opened(created.len(), skipped);
        info!(
            advisor_id = %advisor.id,
            service_id = %service.id,
            resource_id = %resource.id,
            created = created.len(),
            skipped,
            "Slots opened"
        );

        Ok(OpenSlotsResponse {
            created_slots: created.len(),
            skipped,
            slots: created.iter().map(|s| SlotSummary::from_slot(s, tz)).collect(),
        })
    }

    /// OPEN slots that have not ended, within the civil date range.
    pub async fn find_slots(&self, query: FindSlotsQuery) -> Result<FindSlotsResponse, SchedulingError> {
        validate_date_range(query.from_date, query.to_date).map_err(|e| {
            SchedulingError::validation(
                e.message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Invalid date range".to_string()),
            )
        })?;

        let tz = resolve_timezone(query.timezone.as_deref(), self.timezone)?;
        let (from, to) = date_range_bounds(query.from_date, query.to_date, tz)?;

        let filter = OpenSlotFilter {
            from,
            to,
            now: self.clock.now(),
            service_id: query.service_id,
            campus_id: query.campus_id,
            building_id: query.building_id,
            resource_id: query.resource_id,
            limit: self.search_limit,
        };
        let slots = self.slots.find_open(&filter).await?;

        Ok(FindSlotsResponse {
            data: slots
                .into_iter()
                .map(|entity| SlotSummary::from_slot(&Slot::from(entity), tz))
                .collect(),
        })
    }

    /// Remote events on the advisor's calendar overlapping any dated rule.
    pub async fn check_conflicts(
        &self,
        user_id: Uuid,
        request: CheckConflictsRequest,
    ) -> Result<CheckConflictsResponse, SchedulingError> {
        let advisor = active_advisor(&self.catalog, user_id).await?;
        let tz = resolve_timezone(request.timezone.as_deref(), self.timezone)?;

        let windows = rule_windows(&request.rules, tz)?;
        let (Some(min), Some(max)) = (
            windows.iter().map(|w| w.range.start).min(),
            windows.iter().map(|w| w.range.end).max(),
        ) else {
            return Ok(CheckConflictsResponse {
                conflicts: Vec::new(),
            });
        };

        let events = self.calendar.list_events(advisor.user_id, min, max).await?;

        let mut conflicts = Vec::new();
        for event in events.iter().filter(|e| !e.is_cancelled()) {
            let (Some(start), Some(end)) = (event.start, event.end) else {
                continue;
            };
            let range = TimeRange::new(start, end);
            if let Some(window) = windows.iter().find(|w| w.range.overlaps(&range)) {
                conflicts.push(CalendarConflict {
                    event_id: event.id.clone(),
                    summary: event.summary.clone(),
                    start: start.with_timezone(&tz).fixed_offset(),
                    end: end.with_timezone(&tz).fixed_offset(),
                    html_link: event.html_link.clone(),
                    rule_index: window.rule_index,
                });
            }
        }

        Ok(CheckConflictsResponse { conflicts })
    }
}

/// The caller's advisor profile; inactive profiles may not act.
pub(crate) async fn active_advisor(
    catalog: &CatalogRepository,
    user_id: Uuid,
) -> Result<AdvisorProfile, SchedulingError> {
    let advisor = catalog
        .find_advisor_by_user(user_id)
        .await?
        .map(AdvisorProfile::from)
        .ok_or(SchedulingError::NoAdvisorProfile(user_id))?;
    if !advisor.active {
        return Err(SchedulingError::forbidden("Advisor profile is inactive"));
    }
    Ok(advisor)
}

/// Claiming slots of one owner overlapping the candidates.
pub(crate) async fn claims(
    conn: &mut PgConnection,
    scope: ClaimScope,
    owner_id: Uuid,
    candidates: &[TimeRange],
    exclude: Option<Uuid>,
) -> Result<Vec<SlotInterval>, SchedulingError> {
    let starts: Vec<_> = candidates.iter().map(|c| c.start).collect();
    let ends: Vec<_> = candidates.iter().map(|c| c.end).collect();
    let rows = SlotRepository::find_conflicts(conn, scope, owner_id, &starts, &ends, exclude).await?;
    Ok(rows.into_iter().map(SlotInterval::from).collect())
}
