//! Retries calendar publication for reservations that have no event yet.

use std::sync::Arc;

use tracing::info;

use super::scheduler::{Job, JobFrequency};
use crate::services::ReservationManager;

pub struct CalendarBackfillJob {
    reservations: Arc<ReservationManager>,
    interval_secs: u64,
    batch_size: i64,
}

impl CalendarBackfillJob {
    pub fn new(reservations: Arc<ReservationManager>, interval_secs: u64, batch_size: i64) -> Self {
        Self {
            reservations,
            interval_secs,
            batch_size,
        }
    }
}

#[async_trait::async_trait]
impl Job for CalendarBackfillJob {
    fn name(&self) -> &'static str {
        "calendar_backfill"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs.max(1))
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .reservations
            .backfill(self.batch_size)
            .await
            .map_err(|e| format!("Calendar backfill failed: {}", e))?;

        if report.examined > 0 {
            info!(
                examined = report.examined,
                created = report.created,
                skipped_not_connected = report.skipped_not_connected,
                failed = report.failed,
                "Calendar backfill run"
            );
        }
        Ok(())
    }
}
