//! Slot endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    CheckConflictsRequest, CheckConflictsResponse, EditSlotRequest, FindSlotsQuery,
    FindSlotsResponse, OpenSlotsRequest, OpenSlotsResponse, SlotSummary,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Open slots from dated rules.
///
/// POST /api/v1/slots
pub async fn open_slots(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<OpenSlotsRequest>,
) -> Result<(StatusCode, Json<OpenSlotsResponse>), ApiError> {
    request.validate()?;
    let response = state.slots.open_slots(auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Search OPEN slots.
///
/// GET /api/v1/slots?fromDate=..&toDate=..
pub async fn find_slots(
    State(state): State<AppState>,
    _auth: UserAuth,
    Query(query): Query<FindSlotsQuery>,
) -> Result<Json<FindSlotsResponse>, ApiError> {
    query.validate()?;
    Ok(Json(state.slots.find_slots(query).await?))
}

/// Remote calendar events overlapping the given rules.
///
/// POST /api/v1/slots/check-conflicts
pub async fn check_conflicts(
    State(state): State<AppState>,
    auth: UserAuth,
    Json(request): Json<CheckConflictsRequest>,
) -> Result<Json<CheckConflictsResponse>, ApiError> {
    request.validate()?;
    Ok(Json(
        state.slots.check_conflicts(auth.user_id, request).await?,
    ))
}

/// PATCH /api/v1/slots/:slot_id
pub async fn edit_slot(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(slot_id): Path<Uuid>,
    Json(patch): Json<EditSlotRequest>,
) -> Result<Json<SlotSummary>, ApiError> {
    patch.validate()?;
    let slot = state
        .reservations
        .edit_slot(auth.user_id, slot_id, patch)
        .await?;
    info!(slot_id = %slot_id, user_id = %auth.user_id, "Slot edited");
    Ok(Json(slot))
}

/// POST /api/v1/slots/:slot_id/reactivate
pub async fn reactivate_slot(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<SlotSummary>, ApiError> {
    let slot = state
        .reservations
        .reactivate_slot(auth.user_id, slot_id)
        .await?;
    info!(slot_id = %slot_id, user_id = %auth.user_id, "Slot reactivated");
    Ok(Json(slot))
}

/// DELETE /api/v1/slots/:slot_id
pub async fn delete_slot(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(slot_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.reservations.delete_slot(auth.user_id, slot_id).await?;
    info!(slot_id = %slot_id, user_id = %auth.user_id, "Slot deleted");
    Ok(StatusCode::NO_CONTENT)
}
