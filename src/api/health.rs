use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::gtfs::Schedule;
use crate::routing::Timetable;

#[derive(Clone)]
pub struct HealthState {
    pub schedule: Arc<Schedule>,
    pub timetable: Arc<Timetable>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Number of stops in the static schedule
    pub stop_count: usize,
    /// Number of routes in the static schedule
    pub route_count: usize,
    /// Number of trips in the static schedule
    pub trip_count: usize,
    /// Trips routable on the active service date
    pub routable_trip_count: usize,
    /// Service date the in-memory timetable was loaded for
    pub service_date: String,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        stop_count: state.schedule.stops.len(),
        route_count: state.schedule.routes.len(),
        trip_count: state.schedule.trips.len(),
        routable_trip_count: state.timetable.stop_times_by_trip.len(),
        service_date: state.timetable.service_date.to_string(),
    })
}

pub fn router(schedule: Arc<Schedule>, timetable: Arc<Timetable>) -> Router {
    let state = HealthState {
        schedule,
        timetable,
    };
    Router::new().route("/", get(health_check)).with_state(state)
}
