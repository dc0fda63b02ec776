//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: DatabaseHealth,
    pub calendar: CalendarHealth,
}

/// Database health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Calendar integration configuration status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CalendarHealth {
    /// OAuth client credentials are present.
    pub oauth_configured: bool,
    /// A public callback URL is set, so push channels can be opened.
    pub push_configured: bool,
    /// Unexpired push channels; absent when the count failed.
    pub live_channels: Option<i64>,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check endpoint.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let ping = persistence::db::ping(&state.pool).await;
    let db_connected = ping.is_ok();
    let latency_ms = ping.map(|d| d.as_millis() as u64).ok();

    let calendar = &state.config.calendar;
    let live_channels = if db_connected {
        state.watches.live_channel_count().await.ok()
    } else {
        None
    };
    let response = HealthResponse {
        status: if db_connected { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: DatabaseHealth {
            connected: db_connected,
            latency_ms,
        },
        calendar: CalendarHealth {
            oauth_configured: !calendar.client_id.is_empty()
                && !calendar.client_secret.is_empty(),
            push_configured: !calendar.public_base_url.is_empty(),
            live_channels,
        },
    };

    if db_connected {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Liveness probe endpoint.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 OK if the database answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    if persistence::db::ping(&state.pool).await.is_ok() {
        Ok(Json(StatusResponse {
            status: "ready".to_string(),
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
