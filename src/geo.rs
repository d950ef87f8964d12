//! Great-circle geometry helpers shared by the observer, the transfer
//! graph and the routing engine.

/// Spherical Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Assumed pedestrian speed in meters per second.
pub const WALKING_SPEED_M_S: f64 = 1.4;

/// Haversine distance between two WGS84 points, in meters.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Walking duration for a distance, rounded to whole seconds.
pub fn walk_seconds(distance_m: f64) -> i64 {
    (distance_m / WALKING_SPEED_M_S).round() as i64
}
