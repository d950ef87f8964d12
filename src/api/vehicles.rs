use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::error::{not_found, ApiError};
use crate::sync::{ArrivalObserver, LatestArrival};

#[derive(Clone)]
pub struct VehiclesState {
    pub observer: Arc<ArrivalObserver>,
}

/// Latest observed stop arrival for a trip
#[utoipa::path(
    get,
    path = "/api/vehicles/{trip_id}/latest-arrival",
    params(
        ("trip_id" = String, Path, description = "GTFS trip id")
    ),
    responses(
        (status = 200, description = "The latest observed arrival", body = LatestArrival),
        (status = 404, description = "No recent arrival recorded for the trip", body = crate::api::ErrorResponse)
    ),
    tag = "vehicles"
)]
pub async fn latest_arrival(
    State(state): State<VehiclesState>,
    Path(trip_id): Path<String>,
) -> Result<Json<LatestArrival>, ApiError> {
    state
        .observer
        .latest_arrival(&trip_id)
        .map(Json)
        .ok_or_else(|| not_found(format!("No arrivals recorded for trip '{trip_id}'")))
}

pub fn router(observer: Arc<ArrivalObserver>) -> Router {
    let state = VehiclesState { observer };
    Router::new()
        .route("/{trip_id}/latest-arrival", get(latest_arrival))
        .with_state(state)
}
