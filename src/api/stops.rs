use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::{not_found, ApiError};
use crate::gtfs::Schedule;
use crate::services::arrivals::StopArrivalDoc;
use crate::services::StopArrivalsService;

#[derive(Clone)]
pub struct StopsState {
    pub schedule: Arc<Schedule>,
    pub arrivals: Arc<StopArrivalsService>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopDoc {
    pub stop_id: String,
    pub stop_name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopListResponse {
    pub stops: Vec<StopDoc>,
}

/// List all stops served by at least one trip
#[utoipa::path(
    get,
    path = "/api/stops",
    responses(
        (status = 200, description = "All served stops", body = StopListResponse)
    ),
    tag = "stops"
)]
pub async fn list_stops(State(state): State<StopsState>) -> Json<StopListResponse> {
    let mut stops: Vec<StopDoc> = state
        .schedule
        .trips_by_stop
        .keys()
        .filter_map(|stop_id| state.schedule.stops.get(stop_id))
        .map(|stop| StopDoc {
            stop_id: stop.stop_id.clone(),
            stop_name: stop.stop_name.clone(),
            lat: stop.lat,
            lon: stop.lon,
        })
        .collect();
    stops.sort_by(|a, b| a.stop_id.cmp(&b.stop_id));
    Json(StopListResponse { stops })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopArrivalsResponse {
    pub stop_id: String,
    pub arrivals: Vec<StopArrivalDoc>,
}

/// Upcoming arrivals at a stop
#[utoipa::path(
    get,
    path = "/api/stops/{stop_id}/arrivals",
    params(
        ("stop_id" = String, Path, description = "GTFS stop id")
    ),
    responses(
        (status = 200, description = "Upcoming arrivals enriched with real-time data", body = StopArrivalsResponse),
        (status = 404, description = "Unknown stop", body = crate::api::ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn stop_arrivals(
    State(state): State<StopsState>,
    Path(stop_id): Path<String>,
) -> Result<Json<StopArrivalsResponse>, ApiError> {
    let arrivals = state
        .arrivals
        .arrivals_at(&stop_id)
        .await
        .ok_or_else(|| not_found(format!("Stop '{stop_id}' not found")))?;
    Ok(Json(StopArrivalsResponse { stop_id, arrivals }))
}

pub fn router(schedule: Arc<Schedule>, arrivals: Arc<StopArrivalsService>) -> Router {
    let state = StopsState { schedule, arrivals };
    Router::new()
        .route("/", get(list_stops))
        .route("/{stop_id}/arrivals", get(stop_arrivals))
        .with_state(state)
}
