//! GTFS-RT vehicle positions: fetching the protobuf feed and reducing
//! it to the per-trip position map the observer and the arrivals
//! service consume.

use std::collections::HashMap;
use std::time::Duration;

use prost::Message;

use super::error::FeedError;

/// Timeout for a single feed request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The position of one tracked vehicle, keyed by its trip.
#[derive(Debug, Clone)]
pub struct TrackedVehicle {
    pub trip_id: String,
    pub route_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub speed: Option<f32>,
}

/// Fetch and decode the vehicle positions feed.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
) -> Result<gtfs_realtime::FeedMessage, FeedError> {
    let response = client.get(url).timeout(REQUEST_TIMEOUT).send().await?;

    if !response.status().is_success() {
        return Err(FeedError::Status(response.status()));
    }

    let bytes = response.bytes().await?;
    gtfs_realtime::FeedMessage::decode(bytes.as_ref()).map_err(FeedError::from)
}

/// Reduce a feed to trip_id -> position. Only entities carrying a
/// vehicle with both a trip_id and a position are kept; a trip seen
/// twice keeps the last entity, matching feed ordering.
pub fn extract_tracked_vehicles(
    feed: &gtfs_realtime::FeedMessage,
) -> HashMap<String, TrackedVehicle> {
    let mut vehicles = HashMap::new();

    for entity in &feed.entity {
        let Some(vehicle) = &entity.vehicle else {
            continue;
        };
        let Some(trip_id) = vehicle
            .trip
            .as_ref()
            .and_then(|t| t.trip_id.clone())
            .filter(|id| !id.is_empty())
        else {
            continue;
        };
        let Some(position) = &vehicle.position else {
            continue;
        };

        vehicles.insert(
            trip_id.clone(),
            TrackedVehicle {
                trip_id,
                route_id: vehicle.trip.as_ref().and_then(|t| t.route_id.clone()),
                vehicle_id: vehicle.vehicle.as_ref().and_then(|v| v.id.clone()),
                lat: position.latitude as f64,
                lon: position.longitude as f64,
                speed: position.speed,
            },
        );
    }

    vehicles
}

/// Fetch the feed and extract the position map in one step.
pub async fn fetch_tracked_vehicles(
    client: &reqwest::Client,
    url: &str,
) -> Result<HashMap<String, TrackedVehicle>, FeedError> {
    let feed = fetch_feed(client, url).await?;
    Ok(extract_tracked_vehicles(&feed))
}
