//! Domain models for the scheduling core.

pub mod appointment;
pub mod calendar;
pub mod identity;
pub mod profile;
pub mod slot;

pub use appointment::{
    Appointment, AppointmentState, AppointmentSummary, PendingAppointment,
    PendingAppointmentsResponse, ReserveRequest, TransitionResponse,
};
pub use calendar::{
    ActingAs, AttendeeResponse, CalendarConflict, CalendarLink, CheckConflictsRequest,
    CheckConflictsResponse, CreatedEvent, NewCalendarEvent, ReconcileReport, RemoteAttendee,
    RemoteEvent, WatchRegistration, WatchRequest, CALENDAR_PROVIDER_GOOGLE,
};
pub use identity::{
    ConnectUrlResponse, OAuthIdentity, WatchChannel, WatchCoverageReport, WatchStatusResponse,
};
pub use profile::{AdvisorProfile, Resource, Service, TeacherProfile, UserRef};
pub use slot::{
    EditSlotRequest, FindSlotsQuery, FindSlotsResponse, OpenSlotsRequest, OpenSlotsResponse,
    Slot, SlotInterval, SlotRule, SlotState, SlotSummary, SweepReport, TimeRange,
};
