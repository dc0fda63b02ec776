//! Scheduling services and external integrations.

pub mod google_calendar;
pub mod reservation;
pub mod slot_generator;
pub mod token_vault;
pub mod watch_manager;
pub mod webhook_reconciler;

use chrono_tz::Tz;
use domain::SchedulingError;
use shared::time::parse_timezone;

pub use google_calendar::GoogleCalendarClient;
pub use reservation::{BackfillReport, ReservationManager};
pub use slot_generator::SlotGenerator;
pub use token_vault::{AccessTokenSource, OAuthClient, StateSigner, TokenVault};
pub use watch_manager::WatchManager;
pub use webhook_reconciler::{ChannelGate, Notification, WebhookReconciler};

/// The requested timezone, or `default` when none was given.
pub fn resolve_timezone(requested: Option<&str>, default: Tz) -> Result<Tz, SchedulingError> {
    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => Ok(parse_timezone(name)?),
        None => Ok(default),
    }
}
