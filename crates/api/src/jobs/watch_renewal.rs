//! Keeps push channels alive for connected advisors.

use std::sync::Arc;

use tracing::warn;

use super::scheduler::{Job, JobFrequency};
use crate::services::WatchManager;

/// Rotates channels close to expiry, then fills coverage gaps.
pub struct WatchRenewalJob {
    watches: Arc<WatchManager>,
    interval_secs: u64,
}

impl WatchRenewalJob {
    pub fn new(watches: Arc<WatchManager>, interval_secs: u64) -> Self {
        Self {
            watches,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for WatchRenewalJob {
    fn name(&self) -> &'static str {
        "watch_renewal"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs.max(1))
    }

    async fn execute(&self) -> Result<(), String> {
        let renewed = self
            .watches
            .renew_expiring()
            .await
            .map_err(|e| format!("Channel renewal failed: {}", e))?;
        let coverage = self
            .watches
            .ensure_all_advisors()
            .await
            .map_err(|e| format!("Advisor coverage failed: {}", e))?;

        let failed = renewed.failed + coverage.failed;
        if failed > 0 {
            warn!(failed, "Some watch channels could not be opened");
        }
        Ok(())
    }
}
