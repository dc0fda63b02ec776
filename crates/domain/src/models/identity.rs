//! OAuth identities and watch channels.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A user's connection to a calendar provider.
///
/// `refresh_token` holds the sealed form and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthIdentity {
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

impl OAuthIdentity {
    pub fn has_credentials(&self) -> bool {
        self.connected && self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// A push channel on a user's primary calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChannel {
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl WatchChannel {
    /// A channel is live while it outlasts the renewal margin.
    pub fn is_live(&self, now: DateTime<Utc>, renew_margin: Duration) -> bool {
        self.expires_at > now + renew_margin
    }
}

/// Result of a bulk coverage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchCoverageReport {
    pub examined: usize,
    pub already_live: usize,
    pub created: usize,
    pub skipped_no_credentials: usize,
    pub failed: usize,
}

/// Response carrying the provider authorization URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectUrlResponse {
    pub authorization_url: String,
}

/// Response after ensuring a channel for the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatusResponse {
    pub channel_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created: bool,
}
