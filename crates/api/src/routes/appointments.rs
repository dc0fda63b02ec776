//! Appointment endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    AppointmentSummary, PendingAppointmentsResponse, ReserveRequest, TransitionResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Reserve an OPEN slot as the calling teacher.
///
/// POST /api/v1/appointments
pub async fn reserve(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<AppointmentSummary>), ApiError> {
    request.validate()?;
    let summary = state.reservations.reserve(auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// POST /api/v1/appointments/:id/confirm
pub async fn confirm(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, ApiError> {
    Ok(Json(
        state
            .reservations
            .confirm(auth.user_id, appointment_id)
            .await?,
    ))
}

/// POST /api/v1/appointments/:id/decline
pub async fn decline(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, ApiError> {
    Ok(Json(
        state
            .reservations
            .decline(auth.user_id, appointment_id)
            .await?,
    ))
}

/// POST /api/v1/appointments/:id/cancel
pub async fn cancel(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, ApiError> {
    Ok(Json(
        state
            .reservations
            .cancel(auth.user_id, appointment_id)
            .await?,
    ))
}

/// GET /api/v1/appointments/pending/advisor
pub async fn pending_for_advisor(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<Json<PendingAppointmentsResponse>, ApiError> {
    Ok(Json(
        state.reservations.list_pending_advisor(auth.user_id).await?,
    ))
}

/// GET /api/v1/appointments/pending/teacher
pub async fn pending_for_teacher(
    State(state): State<AppState>,
    auth: UserAuth,
) -> Result<Json<PendingAppointmentsResponse>, ApiError> {
    Ok(Json(
        state.reservations.list_pending_teacher(auth.user_id).await?,
    ))
}
