use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use fleetline_core::{ReconcileReport, TripRequest};
use fleetline_shared::{Resource, ResourceKind, Trip};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ManagerScope {
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub manager_id: Uuid,
    /// Archive even while upcoming trips still hold the resource
    #[serde(default)]
    pub force: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", post(create_trip))
        .route("/v1/trips/{id}", put(update_trip))
        .route("/v1/trips/{id}/cancel", post(cancel_trip))
        .route("/v1/trips/{id}/reactivate", post(reactivate_trip))
        .route("/v1/resources/{kind}/{id}/archive", post(archive_resource))
        .route("/v1/reconcile", post(reconcile))
}

/// POST /v1/trips
pub async fn create_trip(
    State(state): State<AppState>,
    Json(req): Json<TripRequest>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let trip = state.scheduler.schedule_trip(req).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

/// PUT /v1/trips/{id}
pub async fn update_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<TripRequest>,
) -> Result<Json<Trip>, AppError> {
    let trip = state.scheduler.update_trip(trip_id, req).await?;
    Ok(Json(trip))
}

/// POST /v1/trips/{id}/cancel
/// Manager override; stays Cancelled until reactivated
pub async fn cancel_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Query(scope): Query<ManagerScope>,
) -> Result<Json<Trip>, AppError> {
    let trip = state.scheduler.cancel_trip(trip_id, scope.manager_id).await?;
    Ok(Json(trip))
}

/// POST /v1/trips/{id}/reactivate
pub async fn reactivate_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Query(scope): Query<ManagerScope>,
) -> Result<Json<Trip>, AppError> {
    let trip = state.scheduler.reactivate_trip(trip_id, scope.manager_id).await?;
    Ok(Json(trip))
}

/// POST /v1/resources/{kind}/{id}/archive
pub async fn archive_resource(
    State(state): State<AppState>,
    Path((kind, resource_id)): Path<(String, Uuid)>,
    Json(req): Json<ArchiveRequest>,
) -> Result<Json<Resource>, AppError> {
    let kind = kind
        .parse::<ResourceKind>()
        .map_err(|e| AppError::NotFoundError(e.to_string()))?;

    let resource = state
        .scheduler
        .archive_resource(kind, resource_id, req.manager_id, req.force)
        .await?;
    Ok(Json(resource))
}

/// POST /v1/reconcile
/// Runs one reconciliation pass right away
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileReport>, AppError> {
    let report = state.reconciler.reconcile_now().await?;
    Ok(Json(report))
}
