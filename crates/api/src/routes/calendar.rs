//! Calendar connect, watch and push-notification handlers.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use domain::models::{ConnectUrlResponse, WatchStatusResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;
use crate::services::Notification;

pub const CHANNEL_ID_HEADER: &str = "X-Goog-Channel-ID";
pub const CHANNEL_TOKEN_HEADER: &str = "X-Goog-Channel-Token";
pub const RESOURCE_STATE_HEADER: &str = "X-Goog-Resource-State";
pub const RESOURCE_ID_HEADER: &str = "X-Goog-Resource-ID";
pub const MESSAGE_NUMBER_HEADER: &str = "X-Goog-Message-Number";

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConnectedResponse {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub connected: bool,
    /// Present when a push channel could be opened right away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchStatusResponse>,
}

/// Provider consent URL for the caller.
///
/// GET /api/v1/calendar/connect
pub async fn connect(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<Json<ConnectUrlResponse>, ApiError> {
    let authorization_url = state.vault.authorization_url(auth.user_id)?;
    Ok(Json(ConnectUrlResponse { authorization_url }))
}

/// Code exchange after consent; then opens a watch channel for the user.
///
/// GET /api/v1/calendar/oauth/callback?code=..&state=..
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Json<CalendarConnectedResponse>, ApiError> {
    if let Some(reason) = query.error {
        return Err(ApiError::Validation(format!("Consent was not granted: {}", reason)));
    }
    let (Some(code), Some(signed_state)) = (query.code, query.state) else {
        return Err(ApiError::Validation(
            "code and state query parameters are required".to_string(),
        ));
    };

    let identity = state.vault.complete_connect(&code, &signed_state).await?;

    let watch = match state.watches.ensure_coverage(identity.user_id).await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(user_id = %identity.user_id, error = %e, "Watch coverage after connect failed");
            None
        }
    };

    Ok(Json(CalendarConnectedResponse {
        user_id: identity.user_id,
        email: identity.email.clone(),
        connected: identity.has_credentials(),
        watch,
    }))
}

/// Ensures the caller's calendar has a live push channel.
///
/// POST /api/v1/calendar/watch
pub async fn ensure_watch(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<Json<WatchStatusResponse>, ApiError> {
    Ok(Json(state.watches.ensure_coverage(auth.user_id).await?))
}

/// Provider push notification. Always acknowledged; work runs detached.
///
/// POST /api/v1/calendar/webhook
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(notification) = notification_from_headers(&headers) else {
        debug!("Webhook without a usable channel id");
        return StatusCode::OK;
    };

    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        let channel_id = notification.channel_id;
        if let Err(e) = reconciler.handle(notification).await {
            error!(channel_id = %channel_id, error = %e, "Webhook reconcile failed");
        }
    });

    StatusCode::OK
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn notification_from_headers(headers: &HeaderMap) -> Option<Notification> {
    let channel_id = header(headers, CHANNEL_ID_HEADER)?.parse().ok()?;
    Some(Notification {
        channel_id,
        channel_token: header(headers, CHANNEL_TOKEN_HEADER).map(str::to_string),
        resource_state: header(headers, RESOURCE_STATE_HEADER)
            .unwrap_or("exists")
            .to_string(),
        resource_id: header(headers, RESOURCE_ID_HEADER).map(str::to_string),
        message_number: header(headers, MESSAGE_NUMBER_HEADER).and_then(|n| n.parse().ok()),
    })
}
