//! Push-channel coverage for connected calendars.

use std::sync::Arc;

use chrono::Duration;
use domain::models::{
    OAuthIdentity, WatchChannel, WatchCoverageReport, WatchRequest, WatchStatusResponse,
    CALENDAR_PROVIDER_GOOGLE,
};
use domain::services::CalendarGateway;
use domain::{CalendarError, SchedulingError};
use persistence::repositories::{CatalogRepository, OAuthIdentityRepository, WatchChannelRepository};
use shared::crypto::hmac_sha256_hex;
use shared::time::Clock;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CalendarConfig;
use crate::middleware::metrics::record_watch_coverage;

/// Keeps one live watch channel per connected user.
pub struct WatchManager {
    channels: WatchChannelRepository,
    identities: OAuthIdentityRepository,
    catalog: CatalogRepository,
    calendar: Arc<dyn CalendarGateway>,
    clock: Arc<dyn Clock>,
    callback_url: String,
    webhook_secret: String,
    ttl: Duration,
    renew_margin: Duration,
}

impl WatchManager {
    pub fn new(
        pool: PgPool,
        calendar: Arc<dyn CalendarGateway>,
        clock: Arc<dyn Clock>,
        config: &CalendarConfig,
    ) -> Self {
        Self {
            channels: WatchChannelRepository::new(pool.clone()),
            identities: OAuthIdentityRepository::new(pool.clone()),
            catalog: CatalogRepository::new(pool),
            calendar,
            clock,
            callback_url: config.webhook_callback_url(),
            webhook_secret: config.webhook_secret.clone(),
            ttl: Duration::seconds(config.channel_ttl_secs),
            renew_margin: Duration::seconds(config.renew_margin_secs),
        }
    }

    /// Number of unexpired channels, for health reporting.
    pub async fn live_channel_count(&self) -> Result<i64, SchedulingError> {
        Ok(self.channels.count_live(self.clock.now()).await?)
    }

    /// Reuses a live channel or opens a new one.
    pub async fn ensure_coverage(&self, user_id: Uuid) -> Result<WatchStatusResponse, SchedulingError> {
        let now = self.clock.now();
        if let Some(channel) = self
            .channels
            .find_live_for_user(user_id, now + self.renew_margin)
            .await?
        {
            return Ok(WatchStatusResponse {
                channel_id: channel.channel_id,
                expires_at: channel.expires_at,
                created: false,
            });
        }

        self.require_credentials(user_id).await?;
        let channel = self.create_channel(user_id).await?;
        Ok(WatchStatusResponse {
            channel_id: channel.channel_id,
            expires_at: channel.expires_at,
            created: true,
        })
    }

    /// Stops every channel of the user and opens a fresh one.
    pub async fn rotate(&self, user_id: Uuid) -> Result<WatchStatusResponse, SchedulingError> {
        self.require_credentials(user_id).await?;

        for entity in self.channels.list_for_user(user_id).await? {
            let channel = WatchChannel::from(entity);
            if let Err(e) = self
                .calendar
                .stop_channel(user_id, channel.channel_id, &channel.resource_id)
                .await
            {
                warn!(channel_id = %channel.channel_id, error = %e, "Failed to stop watch channel");
            }
            self.channels.delete(channel.channel_id).await?;
        }

        let channel = self.create_channel(user_id).await?;
        Ok(WatchStatusResponse {
            channel_id: channel.channel_id,
            expires_at: channel.expires_at,
            created: true,
        })
    }

    /// Brings every active advisor into coverage.
    pub async fn ensure_all_advisors(&self) -> Result<WatchCoverageReport, SchedulingError> {
        let advisors = self.catalog.list_active_advisor_user_ids().await?;
        let mut report = WatchCoverageReport::default();

        for user_id in advisors {
            report.examined += 1;
            match self.ensure_coverage(user_id).await {
                Ok(status) if status.created => report.created += 1,
                Ok(_) => report.already_live += 1,
                Err(SchedulingError::Calendar(CalendarError::NotConnected(_))) => {
                    report.skipped_no_credentials += 1
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Watch coverage failed");
                    report.failed += 1;
                }
            }
        }

        record_watch_coverage(&report);
        info!(
            examined = report.examined,
            created = report.created,
            already_live = report.already_live,
            skipped = report.skipped_no_credentials,
            failed = report.failed,
            "Advisor watch coverage run"
        );
        Ok(report)
    }

    /// Rotates channels expiring within the renewal margin.
    pub async fn renew_expiring(&self) -> Result<WatchCoverageReport, SchedulingError> {
        let threshold = self.clock.now() + self.renew_margin;
        let mut users: Vec<Uuid> = self
            .channels
            .list_expiring(threshold)
            .await?
            .into_iter()
            .map(|c| c.user_id)
            .collect();
        users.sort();
        users.dedup();

        let mut report = WatchCoverageReport::default();
        for user_id in users {
            report.examined += 1;
            match self.rotate(user_id).await {
                Ok(_) => report.created += 1,
                Err(SchedulingError::Calendar(CalendarError::NotConnected(_))) => {
                    report.skipped_no_credentials += 1
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Watch renewal failed");
                    report.failed += 1;
                }
            }
        }
        record_watch_coverage(&report);
        Ok(report)
    }

    async fn require_credentials(&self, user_id: Uuid) -> Result<OAuthIdentity, SchedulingError> {
        self.identities
            .find_by_user(user_id, CALENDAR_PROVIDER_GOOGLE)
            .await?
            .map(OAuthIdentity::from)
            .filter(OAuthIdentity::has_credentials)
            .ok_or_else(|| CalendarError::NotConnected(user_id).into())
    }

    async fn create_channel(&self, user_id: Uuid) -> Result<WatchChannel, SchedulingError> {
        let channel_id = Uuid::new_v4();
        let request = WatchRequest {
            channel_id,
            callback_url: self.callback_url.clone(),
            token: hmac_sha256_hex(&self.webhook_secret, &channel_id.to_string()),
            ttl_secs: self.ttl.num_seconds(),
        };

        let registration = self.calendar.watch_primary_calendar(user_id, &request).await?;
        let expires_at = registration
            .expires_at
            .unwrap_or_else(|| self.clock.now() + self.ttl);

        let channel = self
            .channels
            .insert(channel_id, user_id, &registration.resource_id, expires_at)
            .await?;

        info!(user_id = %user_id, channel_id = %channel_id, expires_at = %expires_at, "Watch channel opened");
        Ok(channel.into())
    }
}
