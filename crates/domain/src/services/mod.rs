//! Domain services for the scheduling core.
//!
//! Services contain business logic that operates on domain models. Everything
//! here is pure except the calendar gateway, which is an async seam.

pub mod calendar;
pub mod conflict;
pub mod lifecycle;
pub mod reconcile;
pub mod slot_generation;

pub use calendar::{CalendarError, CalendarGateway, MockCall, MockCalendarGateway};
pub use conflict::{apply_policy, conflicts_for, partition, Partition};
pub use lifecycle::{apply, is_coherent, Outcome, Transition, TransitionRejected};
pub use reconcile::{decide, ReconcileAction, RemoteObservation};
pub use slot_generation::{generate_candidates, rule_windows, segment, RuleWindow};
