//! Repository implementations for database operations.

pub mod appointment;
pub mod calendar_link;
pub mod catalog;
pub mod oauth_identity;
pub mod slot;
pub mod watch_channel;

pub use appointment::AppointmentRepository;
pub use calendar_link::CalendarLinkRepository;
pub use catalog::CatalogRepository;
pub use oauth_identity::OAuthIdentityRepository;
pub use slot::{ClaimScope, OpenSlotFilter, SlotRepository};
pub use watch_channel::WatchChannelRepository;
