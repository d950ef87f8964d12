use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::api::error::{bad_request, ApiError};
use crate::services::navigation::{NavigationResponse, NearbyStopDoc};
use crate::services::NavigationService;

#[derive(Clone)]
pub struct NavigationState {
    pub navigation: Arc<NavigationService>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NavigateParams {
    /// Origin latitude
    pub origin_lat: f64,
    /// Origin longitude
    pub origin_lon: f64,
    /// Destination latitude
    pub dest_lat: f64,
    /// Destination longitude
    pub dest_lon: f64,
    /// Departure time "HH:MM:SS"; defaults to now
    pub departure_time: Option<String>,
    /// Attach a short search summary to the response
    #[serde(default)]
    pub debug: bool,
}

/// Find routes between two coordinates
#[utoipa::path(
    get,
    path = "/api/navigate",
    params(NavigateParams),
    responses(
        (status = 200, description = "Ranked itineraries, possibly empty", body = NavigationResponse),
        (status = 400, description = "Invalid coordinates or departure time", body = crate::api::ErrorResponse)
    ),
    tag = "navigation"
)]
pub async fn navigate(
    State(state): State<NavigationState>,
    Query(params): Query<NavigateParams>,
) -> Result<Json<NavigationResponse>, ApiError> {
    let mut response = state
        .navigation
        .navigate(
            params.origin_lat,
            params.origin_lon,
            params.dest_lat,
            params.dest_lon,
            params.departure_time.as_deref(),
        )
        .map_err(|e| bad_request(e.to_string()))?;

    if params.debug {
        let origin_candidates = state.navigation.nearby_stops(
            params.origin_lat,
            params.origin_lon,
            state.navigation.default_walk_radius(),
        );
        let dest_candidates = state.navigation.nearby_stops(
            params.dest_lat,
            params.dest_lon,
            state.navigation.default_walk_radius(),
        );
        response.debug_logs = Some(vec![
            format!("origin stops considered: {}", origin_candidates.len()),
            format!("destination stops considered: {}", dest_candidates.len()),
            format!("routes returned: {}", response.routes.len()),
        ]);
    }

    Ok(Json(response))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NearbyStopsParams {
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lon: f64,
    /// Search radius in meters (default 500)
    pub max_distance: Option<f64>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct NearbyStopsResponse {
    pub location: crate::services::navigation::PointDoc,
    pub max_distance_m: f64,
    pub stops: Vec<NearbyStopDoc>,
}

/// Find stops near a location
#[utoipa::path(
    get,
    path = "/api/nearby-stops",
    params(NearbyStopsParams),
    responses(
        (status = 200, description = "Stops within walking range, nearest first", body = NearbyStopsResponse)
    ),
    tag = "navigation"
)]
pub async fn nearby_stops(
    State(state): State<NavigationState>,
    Query(params): Query<NearbyStopsParams>,
) -> Json<NearbyStopsResponse> {
    let max_distance = params
        .max_distance
        .unwrap_or_else(|| state.navigation.default_walk_radius());
    let stops = state
        .navigation
        .nearby_stops(params.lat, params.lon, max_distance);
    Json(NearbyStopsResponse {
        location: crate::services::navigation::PointDoc {
            lat: params.lat,
            lon: params.lon,
        },
        max_distance_m: max_distance,
        stops,
    })
}

pub fn router(navigation: Arc<NavigationService>) -> Router {
    let state = NavigationState { navigation };
    Router::new()
        .route("/navigate", get(navigate))
        .route("/nearby-stops", get(nearby_stops))
        .with_state(state)
}
