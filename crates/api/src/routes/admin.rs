//! Administrative maintenance routes.
//!
//! Callers must hold the administrator flag on their user row.

use axum::{extract::State, Json};
use domain::models::{SweepReport, WatchCoverageReport};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminAuth;

/// Runs EXPIRE and COMPLETE on demand.
///
/// POST /api/v1/admin/sweep
pub async fn sweep(
    State(state): State<AppState>,
    admin: AdminAuth,
) -> Result<Json<SweepReport>, ApiError> {
    let report = state.reservations.sweep().await?;
    info!(
        admin_user_id = %admin.user.id,
        expired = report.expired,
        realized = report.realized,
        "Admin triggered sweep"
    );
    Ok(Json(report))
}

/// Brings every active advisor into watch coverage.
///
/// POST /api/v1/admin/calendar/watch-all
pub async fn watch_all(
    State(state): State<AppState>,
    admin: AdminAuth,
) -> Result<Json<WatchCoverageReport>, ApiError> {
    let report = state.watches.ensure_all_advisors().await?;
    info!(
        admin_user_id = %admin.user.id,
        created = report.created,
        failed = report.failed,
        "Admin triggered watch coverage"
    );
    Ok(Json(report))
}
