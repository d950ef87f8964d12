use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::{not_found, ApiError};
use crate::gtfs::Schedule;

#[derive(Clone)]
pub struct RoutesState {
    pub schedule: Arc<Schedule>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RealLifeIdResponse {
    pub route_id: String,
    pub reallife_id: String,
}

/// Rider-facing id of a route
#[utoipa::path(
    get,
    path = "/api/routes/{route_id}/reallife-id",
    params(
        ("route_id" = String, Path, description = "GTFS route id")
    ),
    responses(
        (status = 200, description = "The rider-facing route id", body = RealLifeIdResponse),
        (status = 404, description = "Unknown route or route without a short name", body = crate::api::ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn reallife_id(
    State(state): State<RoutesState>,
    Path(route_id): Path<String>,
) -> Result<Json<RealLifeIdResponse>, ApiError> {
    let reallife_id = state
        .schedule
        .routes
        .get(&route_id)
        .and_then(|route| route.external_id())
        .ok_or_else(|| not_found("Route not found"))?;
    Ok(Json(RealLifeIdResponse {
        route_id,
        reallife_id,
    }))
}

pub fn router(schedule: Arc<Schedule>) -> Router {
    let state = RoutesState { schedule };
    Router::new()
        .route("/{route_id}/reallife-id", get(reallife_id))
        .with_state(state)
}
