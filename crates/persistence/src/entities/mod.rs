//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod appointment;
pub mod calendar;
pub mod catalog;
pub mod slot;

pub use appointment::{
    AppointmentEntity, AppointmentStateDb, BackfillCandidateEntity, PendingAppointmentEntity,
    ReconcileCandidateEntity,
};
pub use calendar::{CalendarLinkEntity, OAuthIdentityEntity, WatchChannelEntity};
pub use catalog::{ProfileEntity, ResourceEntity, ServiceEntity, UserEntity};
pub use slot::{SlotEntity, SlotIntervalEntity, SlotStateDb, SweepCountsEntity};
