//! Shared types for the arrival observer.

use serde::Serialize;
use utoipa::ToSchema;

/// The most recent observed stop arrival of a trip, as served to API
/// consumers. Entries older than the cache TTL are never returned.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LatestArrival {
    pub trip_id: String,
    pub route_id: Option<String>,
    pub stop_id: String,
    pub stop_name: String,
    pub stop_sequence: u32,
    /// Local wall-clock time the arrival was observed.
    pub timestamp: String,
    /// Observed minus scheduled, in seconds. None when the scheduled
    /// time could not be anchored to a calendar instant.
    pub delay_seconds: Option<i64>,
}
