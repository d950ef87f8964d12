//! Query orchestration: coordinate/time validation, engine invocation,
//! and shaping the engine's itineraries into the external response.

use std::sync::Arc;

use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use serde::Serialize;
use utoipa::ToSchema;

use crate::geo::haversine_distance_m;
use crate::gtfs::static_data::format_gtfs_time;
use crate::routing::raptor::{Journey, Leg, Place, RaptorEngine, MAX_WALKING_DISTANCE_M};
use crate::routing::Timetable;

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("Invalid origin coordinates")]
    InvalidOrigin,
    #[error("Invalid destination coordinates")]
    InvalidDestination,
    #[error("Invalid departure_time format. Use HH:MM:SS")]
    InvalidDepartureTime,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct PointDoc {
    pub lat: f64,
    pub lon: f64,
}

/// A leg endpoint: always a coordinate, plus stop identity when the
/// endpoint is a transit stop.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlaceDoc {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegDoc {
    Walk {
        from: PlaceDoc,
        to: PlaceDoc,
        distance_m: f64,
        duration_seconds: i64,
    },
    Transit {
        /// Rider-facing route id (type prefix + short name); null when
        /// the feed has no short name for the route.
        route_id: Option<String>,
        trip_id: String,
        from_stop_id: String,
        to_stop_id: String,
        from_stop_name: String,
        to_stop_name: String,
        departure_time: String,
        arrival_time: String,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RouteDoc {
    pub total_time_seconds: i64,
    pub total_time_minutes: f64,
    pub legs: Vec<LegDoc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NavigationResponse {
    pub origin: PointDoc,
    pub destination: PointDoc,
    pub straight_distance_m: f64,
    pub departure_time: String,
    pub routes: Vec<RouteDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_logs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NearbyStopDoc {
    pub stop_id: String,
    pub stop_name: String,
    pub lat: f64,
    pub lon: f64,
    pub distance_m: f64,
    pub walking_time_seconds: i64,
}

pub struct NavigationService {
    timetable: Arc<Timetable>,
    engine: RaptorEngine,
    tz: Tz,
}

impl NavigationService {
    pub fn new(timetable: Arc<Timetable>, tz: Tz) -> Self {
        let engine = RaptorEngine::new(timetable.clone());
        Self {
            timetable,
            engine,
            tz,
        }
    }

    pub fn navigate(
        &self,
        origin_lat: f64,
        origin_lon: f64,
        dest_lat: f64,
        dest_lon: f64,
        departure_time: Option<&str>,
    ) -> Result<NavigationResponse, NavigationError> {
        let now = chrono::Utc::now().with_timezone(&self.tz);
        self.navigate_at(origin_lat, origin_lon, dest_lat, dest_lon, departure_time, now)
    }

    /// Like `navigate` with an explicit wall clock, so behaviour around
    /// the service-day rollover is testable.
    pub fn navigate_at(
        &self,
        origin_lat: f64,
        origin_lon: f64,
        dest_lat: f64,
        dest_lon: f64,
        departure_time: Option<&str>,
        now: DateTime<Tz>,
    ) -> Result<NavigationResponse, NavigationError> {
        validate_coordinate(origin_lat, origin_lon).map_err(|_| NavigationError::InvalidOrigin)?;
        validate_coordinate(dest_lat, dest_lon)
            .map_err(|_| NavigationError::InvalidDestination)?;

        let (mut departure_seconds, departure_display) = match departure_time {
            Some(raw) => {
                let secs = crate::gtfs::static_data::parse_gtfs_time(raw)
                    .ok_or(NavigationError::InvalidDepartureTime)?;
                (secs as i64, raw.to_string())
            }
            None => {
                let secs =
                    (now.hour() * 3600 + now.minute() * 60 + now.second()) as i64;
                (secs, now.format("%H:%M:%S").to_string())
            }
        };

        // Before the service-day rollover the timetable belongs to
        // yesterday, so the clock time sits one day into that axis
        // (00:15 queries as 24:15).
        if self.timetable.service_date != now.date_naive() {
            departure_seconds += 86_400;
        }

        let journeys = self
            .engine
            .run((origin_lat, origin_lon), (dest_lat, dest_lon), departure_seconds);

        let routes: Vec<RouteDoc> = journeys.iter().map(|j| self.format_journey(j)).collect();

        let straight = haversine_distance_m(origin_lat, origin_lon, dest_lat, dest_lon);
        let message = if routes.is_empty() {
            Some(
                "No routes found. Try increasing walking distance or adjusting departure time."
                    .to_string(),
            )
        } else {
            None
        };

        Ok(NavigationResponse {
            origin: PointDoc {
                lat: origin_lat,
                lon: origin_lon,
            },
            destination: PointDoc {
                lat: dest_lat,
                lon: dest_lon,
            },
            straight_distance_m: round1(straight),
            departure_time: departure_display,
            routes,
            message,
            debug_logs: None,
        })
    }

    /// Stops within walking range of a coordinate, nearest first.
    pub fn nearby_stops(&self, lat: f64, lon: f64, max_distance_m: f64) -> Vec<NearbyStopDoc> {
        self.timetable
            .nearby_stops(lat, lon, max_distance_m)
            .into_iter()
            .map(|n| {
                let stop = self.timetable.stop(n.stop);
                NearbyStopDoc {
                    stop_id: stop.stop_id.clone(),
                    stop_name: stop.stop_name.clone(),
                    lat: stop.lat,
                    lon: stop.lon,
                    distance_m: round1(n.distance_m),
                    walking_time_seconds: n.walk_seconds,
                }
            })
            .collect()
    }

    /// Default walking radius for the nearby-stops endpoint.
    pub fn default_walk_radius(&self) -> f64 {
        MAX_WALKING_DISTANCE_M
    }

    fn format_journey(&self, journey: &Journey) -> RouteDoc {
        let legs = journey.legs.iter().map(|leg| self.format_leg(leg)).collect();
        RouteDoc {
            total_time_seconds: journey.total_seconds,
            total_time_minutes: round1(journey.total_seconds as f64 / 60.0),
            legs,
        }
    }

    fn format_leg(&self, leg: &Leg) -> LegDoc {
        match leg {
            Leg::Walk {
                from,
                to,
                distance_m,
                duration_seconds,
            } => LegDoc::Walk {
                from: self.format_place(*from),
                to: self.format_place(*to),
                distance_m: round1(*distance_m),
                duration_seconds: *duration_seconds,
            },
            Leg::Transit {
                route_id,
                trip_id,
                from_stop,
                to_stop,
                departure_seconds,
                arrival_seconds,
            } => {
                let from = self.timetable.stop(*from_stop);
                let to = self.timetable.stop(*to_stop);
                LegDoc::Transit {
                    route_id: self
                        .timetable
                        .routes
                        .get(route_id)
                        .and_then(|r| r.external_id()),
                    trip_id: trip_id.clone(),
                    from_stop_id: from.stop_id.clone(),
                    to_stop_id: to.stop_id.clone(),
                    from_stop_name: from.stop_name.clone(),
                    to_stop_name: to.stop_name.clone(),
                    departure_time: format_gtfs_time(*departure_seconds as i32),
                    arrival_time: format_gtfs_time(*arrival_seconds as i32),
                }
            }
        }
    }

    fn format_place(&self, place: Place) -> PlaceDoc {
        match place {
            Place::Coordinate { lat, lon } => PlaceDoc {
                lat,
                lon,
                stop_id: None,
                stop_name: None,
            },
            Place::Stop(idx) => {
                let stop = self.timetable.stop(idx);
                PlaceDoc {
                    lat: stop.lat,
                    lon: stop.lon,
                    stop_id: Some(stop.stop_id.clone()),
                    stop_name: Some(stop.stop_name.clone()),
                }
            }
        }
    }
}

fn validate_coordinate(lat: f64, lon: f64) -> Result<(), ()> {
    if lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
    {
        Ok(())
    } else {
        Err(())
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
