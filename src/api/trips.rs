use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::{not_found, ApiError};
use crate::gtfs::Schedule;

#[derive(Clone)]
pub struct TripsState {
    pub schedule: Arc<Schedule>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TripDoc {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction_id: Option<i32>,
    pub stop_count: usize,
}

/// Look up a trip
#[utoipa::path(
    get,
    path = "/api/trips/{trip_id}",
    params(
        ("trip_id" = String, Path, description = "GTFS trip id")
    ),
    responses(
        (status = 200, description = "The trip", body = TripDoc),
        (status = 404, description = "Unknown trip", body = crate::api::ErrorResponse)
    ),
    tag = "trips"
)]
pub async fn get_trip(
    State(state): State<TripsState>,
    Path(trip_id): Path<String>,
) -> Result<Json<TripDoc>, ApiError> {
    let trip = state
        .schedule
        .trips
        .get(&trip_id)
        .ok_or_else(|| not_found("Trip not found"))?;
    let stop_count = state
        .schedule
        .stop_times
        .get(&trip_id)
        .map_or(0, |rows| rows.len());
    Ok(Json(TripDoc {
        trip_id: trip.trip_id.clone(),
        route_id: trip.route_id.clone(),
        service_id: trip.service_id.clone(),
        headsign: trip.headsign.clone(),
        direction_id: trip.direction_id,
        stop_count,
    }))
}

pub fn router(schedule: Arc<Schedule>) -> Router {
    let state = TripsState { schedule };
    Router::new()
        .route("/{trip_id}", get(get_trip))
        .with_state(state)
}
