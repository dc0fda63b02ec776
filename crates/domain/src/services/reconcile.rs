//! Decisions taken by the webhook reconciler for one appointment.
//!
//! Notifications carry no payload, so every pass re-reads the remote event and
//! compares it with local state. Decisions depend only on the current pair and
//! the observation, which makes replays converge to the same state.

use crate::models::{AppointmentState, AttendeeResponse, RemoteEvent, SlotState};

use crate::errors::CalendarError;
use super::lifecycle::Transition;

/// What the provider says about the linked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteObservation {
    /// The event is gone or cancelled.
    Missing,
    /// The teacher is on the attendee list with this response.
    Attendee(AttendeeResponse),
    /// The event exists but the teacher is not an attendee.
    AttendeeAbsent,
}

impl RemoteObservation {
    /// Reads the teacher's response off a fetched event.
    pub fn from_event(event: &RemoteEvent, teacher_email: &str) -> Self {
        if event.is_cancelled() {
            return RemoteObservation::Missing;
        }
        match event.attendee_response(teacher_email) {
            Some(response) => RemoteObservation::Attendee(response),
            None => RemoteObservation::AttendeeAbsent,
        }
    }

    /// Interprets a fetch result; errors other than not-found are not
    /// observations.
    pub fn from_fetch(
        result: &Result<RemoteEvent, CalendarError>,
        teacher_email: &str,
    ) -> Option<Self> {
        match result {
            Ok(event) => Some(Self::from_event(event, teacher_email)),
            Err(CalendarError::NotFound) => Some(RemoteObservation::Missing),
            Err(_) => None,
        }
    }
}

/// Action for one appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Run the transition; `RemoteDeleted` also drops the link.
    Apply(Transition),
    /// Drop the stale link only.
    ForgetLink,
    Nothing,
}

pub fn decide(
    appointment: AppointmentState,
    slot: SlotState,
    observation: RemoteObservation,
) -> ReconcileAction {
    use crate::models::AppointmentState as A;
    use crate::models::AttendeeResponse as R;

    match (observation, appointment) {
        (RemoteObservation::Missing, A::Pending | A::Confirmed) => {
            ReconcileAction::Apply(Transition::RemoteDeleted)
        }
        (RemoteObservation::Missing, A::Cancelled) => ReconcileAction::ForgetLink,

        (RemoteObservation::Attendee(R::Accepted), A::Pending) => {
            ReconcileAction::Apply(Transition::Confirm)
        }
        (RemoteObservation::Attendee(R::Accepted), A::Cancelled) if slot == SlotState::Cancelled => {
            ReconcileAction::Apply(Transition::Reaccept)
        }

        (RemoteObservation::Attendee(R::Declined | R::Tentative), A::Pending) => {
            ReconcileAction::Apply(Transition::Decline)
        }

        _ => ReconcileAction::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteAttendee;
    use crate::services::lifecycle::apply;

    use crate::models::AppointmentState as A;
    use crate::models::AttendeeResponse as R;
    use crate::models::SlotState as S;

    const TEACHER: &str = "teacher@uni.edu";

    fn event(status: &str, response: Option<AttendeeResponse>) -> RemoteEvent {
        RemoteEvent {
            id: "evt".into(),
            status: Some(status.into()),
            summary: None,
            html_link: None,
            start: None,
            end: None,
            attendees: response
                .map(|response_status| RemoteAttendee {
                    email: TEACHER.into(),
                    response_status,
                    organizer: false,
                    is_self: false,
                })
                .into_iter()
                .collect(),
        }
    }

    /// Runs decide + apply once, returning the new pair and whether the link
    /// would be dropped.
    fn step(
        slot: SlotState,
        appointment: AppointmentState,
        observation: RemoteObservation,
    ) -> (SlotState, AppointmentState, bool) {
        match decide(appointment, slot, observation) {
            ReconcileAction::Apply(transition) => {
                let outcome = apply(transition, slot, Some(appointment)).unwrap();
                let drops_link = transition == Transition::RemoteDeleted;
                (outcome.slot, outcome.appointment.unwrap(), drops_link)
            }
            ReconcileAction::ForgetLink => (slot, appointment, true),
            ReconcileAction::Nothing => (slot, appointment, false),
        }
    }

    #[test]
    fn test_remote_accept_confirms_pending() {
        let observation = RemoteObservation::from_event(&event("confirmed", Some(R::Accepted)), TEACHER);
        let (slot, appointment, dropped) = step(S::Reserved, A::Pending, observation);
        assert_eq!((slot, appointment, dropped), (S::Reserved, A::Confirmed, false));

        assert_eq!(decide(appointment, slot, observation), ReconcileAction::Nothing);
    }

    #[test]
    fn test_remote_delete_cancels_and_drops_link() {
        let observation =
            RemoteObservation::from_fetch(&Err(CalendarError::NotFound), TEACHER).unwrap();
        let (slot, appointment, dropped) = step(S::Reserved, A::Confirmed, observation);
        assert_eq!((slot, appointment, dropped), (S::Cancelled, A::Cancelled, true));

        assert_eq!(
            decide(appointment, slot, observation),
            ReconcileAction::ForgetLink
        );
    }

    #[test]
    fn test_cancelled_event_status_counts_as_missing() {
        let observation =
            RemoteObservation::from_event(&event("cancelled", Some(R::Accepted)), TEACHER);
        assert_eq!(observation, RemoteObservation::Missing);
    }

    #[test]
    fn test_reacceptance_restores_reservation() {
        let declined = RemoteObservation::Attendee(R::Declined);
        let (slot, appointment, _) = step(S::Reserved, A::Pending, declined);
        assert_eq!((slot, appointment), (S::Cancelled, A::Cancelled));

        let accepted = RemoteObservation::Attendee(R::Accepted);
        let (slot, appointment, dropped) = step(slot, appointment, accepted);
        assert_eq!((slot, appointment, dropped), (S::Reserved, A::Confirmed, false));
    }

    #[test]
    fn test_reacceptance_ignored_after_reactivation() {
        let accepted = RemoteObservation::Attendee(R::Accepted);
        assert_eq!(decide(A::Cancelled, S::Open, accepted), ReconcileAction::Nothing);
    }

    #[test]
    fn test_needs_action_and_absent_attendee_do_nothing() {
        for observation in [
            RemoteObservation::Attendee(R::NeedsAction),
            RemoteObservation::AttendeeAbsent,
        ] {
            assert_eq!(decide(A::Pending, S::Reserved, observation), ReconcileAction::Nothing);
        }
        assert_eq!(
            RemoteObservation::from_event(&event("confirmed", None), TEACHER),
            RemoteObservation::AttendeeAbsent
        );
    }

    #[test]
    fn test_decline_only_applies_to_pending() {
        let tentative = RemoteObservation::Attendee(R::Tentative);
        assert_eq!(
            decide(A::Pending, S::Reserved, tentative),
            ReconcileAction::Apply(Transition::Decline)
        );
        assert_eq!(decide(A::Confirmed, S::Reserved, tentative), ReconcileAction::Nothing);
    }

    #[test]
    fn test_transient_fetch_error_is_not_an_observation() {
        let result = Err(CalendarError::Timeout);
        assert!(RemoteObservation::from_fetch(&result, TEACHER).is_none());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let observations = [
            RemoteObservation::Missing,
            RemoteObservation::AttendeeAbsent,
            RemoteObservation::Attendee(R::Accepted),
            RemoteObservation::Attendee(R::Declined),
            RemoteObservation::Attendee(R::Tentative),
            RemoteObservation::Attendee(R::NeedsAction),
        ];
        let starts = [
            (S::Reserved, A::Pending),
            (S::Reserved, A::Confirmed),
            (S::Cancelled, A::Cancelled),
            (S::Open, A::Cancelled),
            (S::Realized, A::Completed),
        ];

        for observation in observations {
            for (slot, appointment) in starts {
                let (slot1, appt1, _) = step(slot, appointment, observation);
                let (slot2, appt2, _) = step(slot1, appt1, observation);
                assert_eq!(
                    (slot1, appt1),
                    (slot2, appt2),
                    "replay changed state for {observation:?} from {slot}/{appointment}"
                );
            }
        }
    }
}
