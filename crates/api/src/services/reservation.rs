//! Reservation manager.
//!
//! The only writer of slot and appointment state after a slot is opened.
//! Every mutation locks the slot row, re-checks the transition table under
//! the lock and persists the resulting pair. Calendar side effects never roll
//! back local state; the webhook reconciler and the backfill job converge the
//! provider later.

use std::sync::Arc;

use chrono::{Duration, Utc};
use chrono_tz::Tz;
use domain::errors::{exclusion_conflict, has_sqlstate, UNIQUE_VIOLATION};
use domain::models::{
    ActingAs, Appointment, AppointmentState, AppointmentSummary, AttendeeResponse, CalendarLink,
    EditSlotRequest, NewCalendarEvent, OAuthIdentity, PendingAppointment, PendingAppointmentsResponse,
    ReserveRequest, Service, Slot, SlotState, SlotSummary, SweepReport, TeacherProfile, TimeRange,
    TransitionResponse, CALENDAR_PROVIDER_GOOGLE,
};
use domain::services::{apply, CalendarGateway, Transition};
use domain::{CalendarError, SchedulingError};
use persistence::entities::PendingAppointmentEntity;
use persistence::repositories::{
    AppointmentRepository, CalendarLinkRepository, CatalogRepository, ClaimScope,
    OAuthIdentityRepository, SlotRepository,
};
use serde::Serialize;
use shared::time::{combine, parse_wall_clock, Clock};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::resolve_timezone;
use super::slot_generator::{active_advisor, claims};
use crate::middleware::metrics::{record_sweep, record_transition};

/// Result of one backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub examined: usize,
    pub created: usize,
    pub skipped_not_connected: usize,
    pub failed: usize,
}

/// Everything needed to publish one appointment as a calendar event.
struct EventContext {
    advisor_user_id: Uuid,
    teacher_email: String,
    event: NewCalendarEvent,
}

/// Orchestrates slot and appointment transitions.
pub struct ReservationManager {
    pool: PgPool,
    catalog: CatalogRepository,
    slots: SlotRepository,
    appointments: AppointmentRepository,
    links: CalendarLinkRepository,
    identities: OAuthIdentityRepository,
    calendar: Arc<dyn CalendarGateway>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl ReservationManager {
    pub fn new(
        pool: PgPool,
        calendar: Arc<dyn CalendarGateway>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            catalog: CatalogRepository::new(pool.clone()),
            slots: SlotRepository::new(pool.clone()),
            appointments: AppointmentRepository::new(pool.clone()),
            links: CalendarLinkRepository::new(pool.clone()),
            identities: OAuthIdentityRepository::new(pool.clone()),
            pool,
            calendar,
            clock,
            timezone,
        }
    }

    // ========================================================================
    // Reserve
    // ========================================================================

    /// Books an OPEN slot for a teacher, then publishes the calendar event.
    pub async fn reserve(
        &self,
        user_id: Uuid,
        request: ReserveRequest,
    ) -> Result<AppointmentSummary, SchedulingError> {
        let teacher = self
            .catalog
            .find_teacher_by_user(user_id)
            .await?
            .map(TeacherProfile::from)
            .filter(|t| t.active)
            .ok_or_else(|| SchedulingError::forbidden("Only teachers can reserve slots"))?;

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let slot = SlotRepository::lock_by_id(&mut *tx, request.slot_id)
            .await?
            .map(Slot::from)
            .filter(|s| !s.has_ended(now))
            .ok_or(SchedulingError::SlotNotAvailable(request.slot_id))?;
        let current = AppointmentRepository::find_current_for_slot(&mut *tx, slot.id)
            .await?
            .map(Appointment::from);

        let outcome = apply(Transition::Reserve, slot.state, current.map(|a| a.state))
            .map_err(|rejected| rejected.into_error(slot.id))?;

        let inserted = AppointmentRepository::insert_pending(
            &mut *tx,
            teacher.id,
            slot.id,
            &request.origin,
            request.notes.as_deref(),
        )
        .await;
        let appointment = match inserted {
            Ok(entity) => Appointment::from(entity),
            Err(e) if has_sqlstate(&e, UNIQUE_VIOLATION) => {
                return Err(SchedulingError::SlotNotAvailable(slot.id))
            }
            Err(e) => return Err(e.into()),
        };
        let slot = Slot::from(SlotRepository::update_state(&mut *tx, slot.id, outcome.slot.into()).await?);

        tx.commit().await?;

        info!(
            appointment_id = %appointment.id,
            slot_id = %slot.id,
            teacher_id = %teacher.id,
            origin = %appointment.origin,
            "Slot reserved"
        );

        let link = match self.publish_event(&appointment, &slot).await {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(
                    appointment_id = %appointment.id,
                    error = %e,
                    "Calendar event not created; backfill will retry"
                );
                None
            }
        };
        record_transition(Transition::Reserve.name(), link.is_some());

        Ok(AppointmentSummary {
            id: appointment.id,
            slot_id: slot.id,
            teacher_id: appointment.teacher_id,
            state: appointment.state,
            slot_state: slot.state,
            origin: appointment.origin,
            notes: appointment.notes,
            start: slot.start_time.with_timezone(&self.timezone).fixed_offset(),
            end: slot.end_time.with_timezone(&self.timezone).fixed_offset(),
            calendar_synced: link.is_some(),
            calendar_html_link: link.and_then(|l| l.html_link),
            created_at: appointment.created_at,
        })
    }

    // ========================================================================
    // Confirm / Decline / Cancel
    // ========================================================================

    pub async fn confirm(
        &self,
        user_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<TransitionResponse, SchedulingError> {
        self.respond(user_id, appointment_id, Transition::Confirm).await
    }

    pub async fn decline(
        &self,
        user_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<TransitionResponse, SchedulingError> {
        self.respond(user_id, appointment_id, Transition::Decline).await
    }

    pub async fn cancel(
        &self,
        user_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<TransitionResponse, SchedulingError> {
        self.respond(user_id, appointment_id, Transition::CancelByAdvisor)
            .await
    }

    async fn respond(
        &self,
        user_id: Uuid,
        appointment_id: Uuid,
        transition: Transition,
    ) -> Result<TransitionResponse, SchedulingError> {
        let appointment = self
            .appointments
            .find_by_id(appointment_id)
            .await?
            .map(Appointment::from)
            .ok_or_else(|| SchedulingError::NotFound(format!("Appointment {}", appointment_id)))?;
        let slot = self
            .slots
            .find_by_id(appointment.slot_id)
            .await?
            .map(Slot::from)
            .ok_or_else(|| SchedulingError::NotFound(format!("Slot {}", appointment.slot_id)))?;

        let advisor_user_id = self.advisor_user_id(slot.advisor_id).await?;
        let teacher_user_id = self.teacher_user_id(appointment.teacher_id).await?;
        let acting_as = if user_id == advisor_user_id {
            ActingAs::Organizer
        } else if user_id == teacher_user_id && transition != Transition::CancelByAdvisor {
            ActingAs::Attendee
        } else {
            return Err(SchedulingError::forbidden(format!(
                "User may not {} this appointment",
                transition.name()
            )));
        };

        // Unlocked precheck; re-validated under the lock below.
        let precheck = apply(transition, slot.state, Some(appointment.state))
            .map_err(|rejected| rejected.into_error(slot.id))?;

        let link = self
            .links
            .find_by_appointment(appointment.id)
            .await?
            .map(CalendarLink::from);

        // Re-cancelling still removes a lingering remote event.
        let needs_side_effect = precheck.changed || transition == Transition::CancelByAdvisor;
        let calendar_result = match &link {
            Some(link) if needs_side_effect => Some(
                self.calendar_side_effect(transition, user_id, acting_as, advisor_user_id, &appointment, link)
                    .await,
            ),
            _ => None,
        };
        let calendar_error = match &calendar_result {
            Some(Err(e)) => {
                warn!(
                    appointment_id = %appointment.id,
                    operation = transition.name(),
                    error = %e,
                    "Calendar side effect failed; local state still updated"
                );
                Some(e.kind().as_str().to_string())
            }
            _ => None,
        };
        let calendar_synced = match calendar_result {
            Some(result) => result.is_ok(),
            None => link.is_some(),
        };

        let mut tx = self.pool.begin().await?;
        let slot = SlotRepository::lock_by_id(&mut *tx, slot.id)
            .await?
            .map(Slot::from)
            .ok_or_else(|| SchedulingError::NotFound(format!("Slot {}", slot.id)))?;
        let appointment = AppointmentRepository::lock_by_id(&mut *tx, appointment.id)
            .await?
            .map(Appointment::from)
            .ok_or_else(|| SchedulingError::NotFound(format!("Appointment {}", appointment_id)))?;

        let outcome = apply(transition, slot.state, Some(appointment.state))
            .map_err(|rejected| rejected.into_error(slot.id))?;
        let (slot_state, appointment_state) =
            persist_outcome(&mut *tx, &slot, &appointment, outcome.slot, outcome.appointment).await?;

        if transition == Transition::CancelByAdvisor {
            CalendarLinkRepository::delete_by_appointment(&mut *tx, appointment.id).await?;
        }

        tx.commit().await?;

        record_transition(transition.name(), calendar_synced);
        info!(
            appointment_id = %appointment.id,
            slot_id = %slot.id,
            operation = transition.name(),
            appointment_state = %appointment_state,
            slot_state = %slot_state,
            calendar_synced,
            "Appointment transition applied"
        );

        Ok(TransitionResponse {
            appointment_id: appointment.id,
            slot_id: slot.id,
            appointment_state,
            slot_state,
            calendar_synced,
            calendar_error,
        })
    }

    async fn calendar_side_effect(
        &self,
        transition: Transition,
        acting_user_id: Uuid,
        acting_as: ActingAs,
        advisor_user_id: Uuid,
        appointment: &Appointment,
        link: &CalendarLink,
    ) -> Result<(), CalendarError> {
        let response = match transition {
            Transition::CancelByAdvisor => {
                return self
                    .calendar
                    .delete_event(advisor_user_id, &link.provider_event_id)
                    .await
            }
            Transition::Confirm => AttendeeResponse::Accepted,
            _ => AttendeeResponse::Declined,
        };

        let teacher_email = self
            .teacher_email(appointment.teacher_id)
            .await
            .map_err(|e| CalendarError::Storage(e.to_string()))?;
        self.calendar
            .set_attendee_response(
                acting_user_id,
                acting_as,
                &link.provider_event_id,
                &teacher_email,
                response,
            )
            .await?;
        self.links
            .touch(link.id)
            .await
            .map_err(|e| CalendarError::Storage(e.to_string()))
    }

    // ========================================================================
    // Slot maintenance
    // ========================================================================

    /// Moves an OPEN slot or replaces its notes.
    pub async fn edit_slot(
        &self,
        user_id: Uuid,
        slot_id: Uuid,
        patch: EditSlotRequest,
    ) -> Result<SlotSummary, SchedulingError> {
        let advisor = active_advisor(&self.catalog, user_id).await?;
        let tz = resolve_timezone(patch.timezone.as_deref(), self.timezone)?;
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;
        let slot = lock_owned_slot(&mut *tx, advisor.id, slot_id).await?;
        let current = AppointmentRepository::find_current_for_slot(&mut *tx, slot.id).await?;
        apply(Transition::Edit, slot.state, current.map(|a| a.state.into()))
            .map_err(|rejected| rejected.into_error(slot.id))?;
        if slot.has_ended(now) {
            return Err(SchedulingError::StateForbidden {
                operation: Transition::Edit.name(),
                detail: "slot has ended".into(),
            });
        }

        let range = if patch.moves_slot() {
            let local = slot.start_time.with_timezone(&tz);
            let date = patch.date.unwrap_or_else(|| local.date_naive());
            let time = match patch.start_time.as_deref() {
                Some(value) => parse_wall_clock(value)?,
                None => local.time(),
            };
            let start = combine(date, time, tz)?.with_timezone(&Utc);

            let service = self
                .catalog
                .find_service(slot.service_id)
                .await?
                .map(Service::from)
                .filter(Service::is_schedulable)
                .ok_or_else(|| SchedulingError::validation("Slot service is inactive"))?;
            let end = start + Duration::minutes(i64::from(service.duration_minutes));
            if start <= now {
                return Err(SchedulingError::validation("Slot cannot start in the past"));
            }

            let candidate = [TimeRange::new(start, end)];
            let resource_hits =
                claims(&mut *tx, ClaimScope::Resource, slot.resource_id, &candidate, Some(slot.id))
                    .await?;
            if !resource_hits.is_empty() {
                return Err(SchedulingError::ResourceBusy(resource_hits));
            }
            let advisor_hits =
                claims(&mut *tx, ClaimScope::Advisor, slot.advisor_id, &candidate, Some(slot.id))
                    .await?;
            if !advisor_hits.is_empty() {
                return Err(SchedulingError::AdvisorTimeClash(advisor_hits));
            }
            candidate[0]
        } else {
            slot.range()
        };

        let updated = SlotRepository::update_schedule(
            &mut *tx,
            slot.id,
            range.start,
            range.end,
            patch.notes.as_deref(),
        )
        .await
        .map(Slot::from)
        .map_err(exclusion_conflict)?;
        tx.commit().await?;

        info!(slot_id = %updated.id, start = %updated.start_time, "Slot edited");
        Ok(SlotSummary::from_slot(&updated, tz))
    }

    /// Re-offers a CANCELLED slot that has not ended.
    pub async fn reactivate_slot(
        &self,
        user_id: Uuid,
        slot_id: Uuid,
    ) -> Result<SlotSummary, SchedulingError> {
        let advisor = active_advisor(&self.catalog, user_id).await?;
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;
        let slot = lock_owned_slot(&mut *tx, advisor.id, slot_id).await?;
        if slot.has_ended(now) {
            return Err(SchedulingError::StateForbidden {
                operation: Transition::Reactivate.name(),
                detail: "slot has ended".into(),
            });
        }
        let current = AppointmentRepository::find_current_for_slot(&mut *tx, slot.id).await?;
        let outcome = apply(Transition::Reactivate, slot.state, current.map(|a| a.state.into()))
            .map_err(|rejected| rejected.into_error(slot.id))?;

        let updated = Slot::from(SlotRepository::update_state(&mut *tx, slot.id, outcome.slot.into()).await?);
        tx.commit().await?;

        info!(slot_id = %updated.id, "Slot reactivated");
        Ok(SlotSummary::from_slot(&updated, self.timezone))
    }

    /// Removes an OPEN slot that never had an appointment.
    pub async fn delete_slot(&self, user_id: Uuid, slot_id: Uuid) -> Result<(), SchedulingError> {
        let advisor = active_advisor(&self.catalog, user_id).await?;

        let mut tx = self.pool.begin().await?;
        let slot = lock_owned_slot(&mut *tx, advisor.id, slot_id).await?;
        let current = AppointmentRepository::find_current_for_slot(&mut *tx, slot.id).await?;
        apply(Transition::Delete, slot.state, current.map(|a| a.state.into()))
            .map_err(|rejected| rejected.into_error(slot.id))?;

        SlotRepository::delete(&mut *tx, slot.id).await?;
        tx.commit().await?;

        info!(slot_id = %slot.id, "Slot deleted");
        Ok(())
    }

    /// Expires ended OPEN slots and realizes ended RESERVED ones.
    pub async fn sweep(&self) -> Result<SweepReport, SchedulingError> {
        let counts = self.slots.sweep(self.clock.now()).await?;
        let report = SweepReport {
            expired: counts.expired,
            realized: counts.realized,
            completed_appointments: counts.completed_appointments,
        };
        record_sweep(&report);
        if report != SweepReport::default() {
            info!(
                expired = report.expired,
                realized = report.realized,
                completed = report.completed_appointments,
                "Sweep advanced slots"
            );
        }
        Ok(report)
    }

    // ========================================================================
    // Pending lists
    // ========================================================================

    pub async fn list_pending_advisor(
        &self,
        user_id: Uuid,
    ) -> Result<PendingAppointmentsResponse, SchedulingError> {
        let advisor = active_advisor(&self.catalog, user_id).await?;
        let rows = self.appointments.list_pending_for_advisor(advisor.id).await?;
        Ok(self.pending_response(rows))
    }

    pub async fn list_pending_teacher(
        &self,
        user_id: Uuid,
    ) -> Result<PendingAppointmentsResponse, SchedulingError> {
        let teacher = self
            .catalog
            .find_teacher_by_user(user_id)
            .await?
            .map(TeacherProfile::from)
            .ok_or_else(|| SchedulingError::forbidden("User has no teacher profile"))?;
        let rows = self.appointments.list_pending_for_teacher(teacher.id).await?;
        Ok(self.pending_response(rows))
    }

    fn pending_response(&self, rows: Vec<PendingAppointmentEntity>) -> PendingAppointmentsResponse {
        let tz = self.timezone;
        PendingAppointmentsResponse {
            data: rows
                .into_iter()
                .map(|row| PendingAppointment {
                    id: row.id,
                    slot_id: row.slot_id,
                    state: row.state.into(),
                    service_id: row.service_id,
                    resource_id: row.resource_id,
                    advisor_id: row.advisor_id,
                    teacher_id: row.teacher_id,
                    counterpart_name: row.counterpart_name,
                    origin: row.origin,
                    notes: row.notes,
                    start: row.start_time.with_timezone(&tz).fixed_offset(),
                    end: row.end_time.with_timezone(&tz).fixed_offset(),
                    created_at: row.created_at,
                })
                .collect(),
        }
    }

    // ========================================================================
    // Calendar publication
    // ========================================================================

    /// Creates calendar events for active appointments that have none.
    pub async fn backfill(&self, limit: i64) -> Result<BackfillReport, SchedulingError> {
        let candidates = self
            .appointments
            .find_backfill_candidates(self.clock.now(), limit)
            .await?;

        let mut report = BackfillReport::default();
        for candidate in candidates {
            report.examined += 1;

            let appointment = self.appointments.find_by_id(candidate.appointment_id).await?;
            let slot = self.slots.find_by_id(candidate.slot_id).await?;
            let (Some(appointment), Some(slot)) = (appointment, slot) else {
                continue;
            };
            let appointment = Appointment::from(appointment);
            if !appointment.state.is_active() {
                continue;
            }

            match self.publish_event(&appointment, &Slot::from(slot)).await {
                Ok(_) => report.created += 1,
                Err(SchedulingError::Calendar(CalendarError::NotConnected(_))) => {
                    report.skipped_not_connected += 1
                }
                Err(e) => {
                    warn!(appointment_id = %appointment.id, error = %e, "Calendar backfill failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Creates the provider event for an appointment and stores its link.
    async fn publish_event(
        &self,
        appointment: &Appointment,
        slot: &Slot,
    ) -> Result<CalendarLink, SchedulingError> {
        let context = self.event_context(appointment, slot).await?;

        let identity = self
            .identities
            .find_by_user(context.advisor_user_id, CALENDAR_PROVIDER_GOOGLE)
            .await?
            .map(OAuthIdentity::from)
            .filter(|i| i.has_credentials())
            .ok_or(CalendarError::NotConnected(context.advisor_user_id))?;

        let created = self
            .calendar
            .create_event(context.advisor_user_id, &context.event)
            .await?;

        let inserted = self
            .links
            .insert(
                appointment.id,
                identity.id,
                CALENDAR_PROVIDER_GOOGLE,
                &created.provider_event_id,
                created.html_link.as_deref(),
            )
            .await?;

        match inserted {
            Some(link) => {
                debug!(
                    appointment_id = %appointment.id,
                    teacher_email = %context.teacher_email,
                    event_id = %created.provider_event_id,
                    "Calendar link stored"
                );
                Ok(link.into())
            }
            None => {
                // Another writer linked the appointment first; drop our duplicate.
                if let Err(e) = self
                    .calendar
                    .delete_event(context.advisor_user_id, &created.provider_event_id)
                    .await
                {
                    warn!(event_id = %created.provider_event_id, error = %e, "Duplicate event not removed");
                }
                self.links
                    .find_by_appointment(appointment.id)
                    .await?
                    .map(CalendarLink::from)
                    .ok_or_else(|| {
                        SchedulingError::NotFound(format!("Calendar link of {}", appointment.id))
                    })
            }
        }
    }

    async fn event_context(
        &self,
        appointment: &Appointment,
        slot: &Slot,
    ) -> Result<EventContext, SchedulingError> {
        let advisor_user_id = self.advisor_user_id(slot.advisor_id).await?;
        let teacher_email = self.teacher_email(appointment.teacher_id).await?;
        let service = self
            .catalog
            .find_service(slot.service_id)
            .await?
            .map(Service::from)
            .ok_or_else(|| SchedulingError::NotFound(format!("Service {}", slot.service_id)))?;
        let location = self.catalog.resource_location(slot.resource_id).await?;

        let mut description = format!("Reservado vía {}", appointment.origin);
        if let Some(notes) = appointment.notes.as_deref() {
            description.push_str("\n\n");
            description.push_str(notes);
        }

        Ok(EventContext {
            advisor_user_id,
            event: NewCalendarEvent {
                title: format!("Asesoría: {}", service.name),
                description: Some(description),
                location,
                start: slot.start_time,
                end: slot.end_time,
                timezone: self.timezone,
                attendees: vec![teacher_email.clone()],
                create_meet_link: true,
            },
            teacher_email,
        })
    }

    async fn advisor_user_id(&self, advisor_id: Uuid) -> Result<Uuid, SchedulingError> {
        self.catalog
            .find_advisor_by_id(advisor_id)
            .await?
            .map(|p| p.user_id)
            .ok_or_else(|| SchedulingError::NotFound(format!("Advisor {}", advisor_id)))
    }

    async fn teacher_user_id(&self, teacher_id: Uuid) -> Result<Uuid, SchedulingError> {
        self.catalog
            .find_teacher_by_id(teacher_id)
            .await?
            .map(|p| p.user_id)
            .ok_or_else(|| SchedulingError::NotFound(format!("Teacher {}", teacher_id)))
    }

    async fn teacher_email(&self, teacher_id: Uuid) -> Result<String, SchedulingError> {
        let user_id = self.teacher_user_id(teacher_id).await?;
        self.catalog
            .find_user(user_id)
            .await?
            .map(|u| u.email)
            .ok_or_else(|| SchedulingError::NotFound(format!("User {}", user_id)))
    }
}

/// Locks a slot owned by `advisor_id`.
async fn lock_owned_slot(
    conn: &mut PgConnection,
    advisor_id: Uuid,
    slot_id: Uuid,
) -> Result<Slot, SchedulingError> {
    let slot = SlotRepository::lock_by_id(conn, slot_id)
        .await?
        .map(Slot::from)
        .ok_or_else(|| SchedulingError::NotFound(format!("Slot {}", slot_id)))?;
    if slot.advisor_id != advisor_id {
        return Err(SchedulingError::forbidden("Slot belongs to another advisor"));
    }
    Ok(slot)
}

/// Writes the states that differ from the locked rows.
pub(crate) async fn persist_outcome(
    conn: &mut PgConnection,
    slot: &Slot,
    appointment: &Appointment,
    slot_after: SlotState,
    appointment_after: Option<AppointmentState>,
) -> Result<(SlotState, AppointmentState), SchedulingError> {
    let appointment_state = appointment_after.unwrap_or(appointment.state);
    if appointment_state != appointment.state {
        AppointmentRepository::update_state(&mut *conn, appointment.id, appointment_state.into())
            .await?;
    }
    if slot_after != slot.state {
        SlotRepository::update_state(&mut *conn, slot.id, slot_after.into()).await?;
    }
    Ok((slot_after, appointment_state))
}
