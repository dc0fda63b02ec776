//! Expires and completes slots whose end has passed.

use std::sync::Arc;

use tracing::info;

use super::scheduler::{Job, JobFrequency};
use crate::services::ReservationManager;

pub struct SweepJob {
    reservations: Arc<ReservationManager>,
    interval_secs: u64,
}

impl SweepJob {
    pub fn new(reservations: Arc<ReservationManager>, interval_secs: u64) -> Self {
        Self {
            reservations,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for SweepJob {
    fn name(&self) -> &'static str {
        "slot_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs.max(1))
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .reservations
            .sweep()
            .await
            .map_err(|e| format!("Sweep failed: {}", e))?;

        if report.expired + report.realized > 0 {
            info!(
                expired = report.expired,
                realized = report.realized,
                completed_appointments = report.completed_appointments,
                "Swept ended slots"
            );
        }
        Ok(())
    }
}
