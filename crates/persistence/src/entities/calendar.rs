//! Calendar link, OAuth identity and watch channel entities.

use chrono::{DateTime, Utc};
use domain::models::{CalendarLink, OAuthIdentity, WatchChannel};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the calendar_links table.
#[derive(Debug, Clone, FromRow)]
pub struct CalendarLinkEntity {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub identity_id: Uuid,
    pub provider: String,
    pub provider_event_id: String,
    pub html_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CalendarLinkEntity> for CalendarLink {
    fn from(entity: CalendarLinkEntity) -> Self {
        Self {
            id: entity.id,
            appointment_id: entity.appointment_id,
            identity_id: entity.identity_id,
            provider: entity.provider,
            provider_event_id: entity.provider_event_id,
            html_link: entity.html_link,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the oauth_identities table.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthIdentityEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub refresh_token: Option<String>,
    pub connected: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OAuthIdentityEntity> for OAuthIdentity {
    fn from(entity: OAuthIdentityEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            provider: entity.provider,
            provider_user_id: entity.provider_user_id,
            email: entity.email,
            refresh_token: entity.refresh_token,
            connected: entity.connected,
            last_sync_at: entity.last_sync_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the watch_channels table.
#[derive(Debug, Clone, FromRow)]
pub struct WatchChannelEntity {
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<WatchChannelEntity> for WatchChannel {
    fn from(entity: WatchChannelEntity) -> Self {
        Self {
            channel_id: entity.channel_id,
            user_id: entity.user_id,
            resource_id: entity.resource_id,
            expires_at: entity.expires_at,
            created_at: entity.created_at,
        }
    }
}
