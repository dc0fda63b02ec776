//! Slot and appointment state machine.
//!
//! Every mutation of slot or appointment state is decided here first; the
//! store only persists the resulting pair. Time preconditions (`end < now`)
//! are checked by the callers, which own the clock.

use uuid::Uuid;

use crate::errors::SchedulingError;
use crate::models::{AppointmentState, SlotState};

/// An operation on a slot and its current appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Reserve,
    Confirm,
    Decline,
    CancelByAdvisor,
    RemoteDeleted,
    Reaccept,
    Expire,
    Complete,
    Edit,
    Delete,
    Reactivate,
}

impl Transition {
    pub const ALL: [Transition; 11] = [
        Transition::Reserve,
        Transition::Confirm,
        Transition::Decline,
        Transition::CancelByAdvisor,
        Transition::RemoteDeleted,
        Transition::Reaccept,
        Transition::Expire,
        Transition::Complete,
        Transition::Edit,
        Transition::Delete,
        Transition::Reactivate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Reserve => "reserve",
            Transition::Confirm => "confirm",
            Transition::Decline => "decline",
            Transition::CancelByAdvisor => "cancel",
            Transition::RemoteDeleted => "apply remote deletion",
            Transition::Reaccept => "re-accept",
            Transition::Expire => "expire",
            Transition::Complete => "complete",
            Transition::Edit => "edit slot",
            Transition::Delete => "delete slot",
            Transition::Reactivate => "reactivate slot",
        }
    }
}

/// States after a permitted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub slot: SlotState,
    pub appointment: Option<AppointmentState>,
    /// False when the transition was an idempotent repeat.
    pub changed: bool,
}

impl Outcome {
    fn to(slot: SlotState, appointment: Option<AppointmentState>) -> Self {
        Self {
            slot,
            appointment,
            changed: true,
        }
    }

    fn unchanged(slot: SlotState, appointment: Option<AppointmentState>) -> Self {
        Self {
            slot,
            appointment,
            changed: false,
        }
    }
}

/// A transition whose precondition does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRejected {
    pub transition: Transition,
    pub slot: SlotState,
    pub appointment: Option<AppointmentState>,
}

impl TransitionRejected {
    pub fn detail(&self) -> String {
        match self.appointment {
            Some(appointment) => format!("slot is {} and appointment is {}", self.slot, appointment),
            None => format!("slot is {}", self.slot),
        }
    }

    /// Typed error for callers; a failed reserve reads as an unavailable slot.
    pub fn into_error(self, slot_id: Uuid) -> SchedulingError {
        match self.transition {
            Transition::Reserve => SchedulingError::SlotNotAvailable(slot_id),
            transition => SchedulingError::StateForbidden {
                operation: transition.name(),
                detail: self.detail(),
            },
        }
    }
}

impl std::fmt::Display for TransitionRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot {}: {}", self.transition.name(), self.detail())
    }
}

/// Decides the state pair after `transition`.
///
/// `appointment` is the slot's active appointment, or the most recent
/// cancelled one when no active appointment exists.
pub fn apply(
    transition: Transition,
    slot: SlotState,
    appointment: Option<AppointmentState>,
) -> Result<Outcome, TransitionRejected> {
    use crate::models::AppointmentState as A;
    use crate::models::SlotState as S;

    let active = appointment.is_some_and(|a| a.is_active());
    let outcome = match (transition, slot, appointment) {
        (Transition::Reserve, S::Open, _) if !active => Some(Outcome::to(S::Reserved, Some(A::Pending))),

        (Transition::Confirm, S::Reserved, Some(A::Pending)) => {
            Some(Outcome::to(S::Reserved, Some(A::Confirmed)))
        }
        (Transition::Confirm, S::Reserved, Some(A::Confirmed)) => {
            Some(Outcome::unchanged(S::Reserved, Some(A::Confirmed)))
        }

        (Transition::Decline, S::Reserved, Some(A::Pending | A::Confirmed)) => {
            Some(Outcome::to(S::Cancelled, Some(A::Cancelled)))
        }

        (
            Transition::CancelByAdvisor | Transition::RemoteDeleted,
            S::Reserved,
            Some(A::Pending | A::Confirmed),
        ) => Some(Outcome::to(S::Cancelled, Some(A::Cancelled))),
        (Transition::CancelByAdvisor | Transition::RemoteDeleted, slot, Some(A::Cancelled)) => {
            Some(Outcome::unchanged(slot, Some(A::Cancelled)))
        }

        (Transition::Reaccept, S::Cancelled, Some(A::Cancelled)) => {
            Some(Outcome::to(S::Reserved, Some(A::Confirmed)))
        }

        (Transition::Expire, S::Open, _) if !active => Some(Outcome::to(S::Expired, appointment)),

        (Transition::Complete, S::Reserved, Some(A::Pending | A::Confirmed)) => {
            Some(Outcome::to(S::Realized, Some(A::Completed)))
        }

        (Transition::Edit, S::Open, _) if !active => Some(Outcome::to(S::Open, appointment)),

        (Transition::Delete, S::Open, None) => Some(Outcome::to(S::Open, None)),

        (Transition::Reactivate, S::Cancelled, None | Some(A::Cancelled)) => {
            Some(Outcome::to(S::Open, appointment))
        }

        _ => None,
    };

    outcome.ok_or(TransitionRejected {
        transition,
        slot,
        appointment,
    })
}

/// Whether a slot and appointment state may coexist.
pub fn is_coherent(slot: SlotState, appointment: AppointmentState) -> bool {
    match appointment {
        AppointmentState::Pending | AppointmentState::Confirmed => slot == SlotState::Reserved,
        AppointmentState::Completed => slot == SlotState::Realized,
        AppointmentState::Cancelled => true,
    }
}
