use axum::{extract::State, routing::post, Json, Router};
use fleetline_core::{Availability, TripWindow};
use fleetline_shared::{Resource, ResourceKind, TripSchedule};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub kind: ResourceKind,
    pub resource_id: Uuid,
    pub manager_id: Uuid,
    #[serde(flatten)]
    pub schedule: TripSchedule,
    /// Set when checking on behalf of an edit to that trip
    #[serde(default)]
    pub exclude_trip_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub kind: ResourceKind,
    pub resource_id: Uuid,
    pub available: bool,
    #[serde(flatten)]
    pub detail: Availability,
}

#[derive(Debug, Deserialize)]
pub struct FreeResourcesRequest {
    pub kind: ResourceKind,
    pub manager_id: Uuid,
    #[serde(flatten)]
    pub schedule: TripSchedule,
    #[serde(default)]
    pub exclude_trip_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/availability", post(check_availability))
        .route("/v1/availability/resources", post(free_resources))
}

/// POST /v1/availability
/// Whether one driver or bus is free for the requested trip window
pub async fn check_availability(
    State(state): State<AppState>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let window = TripWindow::of(&req.schedule).map_err(|e| AppError::ValidationError(e.to_string()))?;

    let detail = state
        .checker
        .check(req.kind, req.resource_id, req.manager_id, &window, req.exclude_trip_id)
        .await?;

    Ok(Json(AvailabilityResponse {
        kind: req.kind,
        resource_id: req.resource_id,
        available: detail.is_available(),
        detail,
    }))
}

/// POST /v1/availability/resources
/// Every driver or bus of the manager that is free for the window
pub async fn free_resources(
    State(state): State<AppState>,
    Json(req): Json<FreeResourcesRequest>,
) -> Result<Json<Vec<Resource>>, AppError> {
    let window = TripWindow::of(&req.schedule).map_err(|e| AppError::ValidationError(e.to_string()))?;

    let resources = state
        .checker
        .available_resources(req.kind, req.manager_id, &window, req.exclude_trip_id)
        .await?;

    Ok(Json(resources))
}
