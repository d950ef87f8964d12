//! The read-only timetable the routing engine runs over: stop-times of
//! the active service date with stop ids interned to dense indexes, and
//! the precomputed pedestrian transfer graph.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Timelike};
use chrono_tz::Tz;
use tracing::info;

use crate::geo::{haversine_distance_m, walk_seconds};
use crate::gtfs::static_data::{Route, StopTime, Trip};
use crate::gtfs::Schedule;
use crate::realistic::RealisticTable;

/// Maximum stop-to-stop distance that gets a walking transfer edge.
pub const MAX_WALK_TRANSFER_M: f64 = 500.0;

/// Coordinate-box prefilter applied before the exact distance test,
/// bounding graph construction to near-linear work in practice.
pub const BOX_PREFILTER_DEG: f64 = 0.01;

/// Cap on nearby-stop candidate lists.
pub const MAX_NEARBY_STOPS: usize = 15;

/// Local wall-clock boundary of the service day: before 04:20 the
/// previous day's schedule is still the active one, keeping late-night
/// trips routable.
pub const SERVICE_DAY_ROLLOVER: (u32, u32) = (4, 20);

/// A stop as the engine sees it, addressed by dense index.
#[derive(Debug, Clone)]
pub struct TimetableStop {
    pub stop_id: String,
    pub stop_name: String,
    pub lat: f64,
    pub lon: f64,
}

/// One stop-time row with its stop interned.
#[derive(Debug, Clone, Copy)]
pub struct TripStop {
    pub stop: usize,
    pub stop_sequence: u32,
    pub arrival_time: i32,
    pub departure_time: i32,
}

/// A directed walking edge of the transfer graph. Edges are always
/// inserted in both directions with equal duration.
#[derive(Debug, Clone, Copy)]
pub struct TransferEdge {
    pub to: usize,
    pub duration_seconds: i64,
    pub distance_m: f64,
}

/// A stop near a queried coordinate.
#[derive(Debug, Clone)]
pub struct NearbyStop {
    pub stop: usize,
    pub distance_m: f64,
    pub walk_seconds: i64,
}

pub struct Timetable {
    stops: Vec<TimetableStop>,
    stop_index: HashMap<String, usize>,
    pub trips: HashMap<String, Trip>,
    /// trip_id -> interned rows ordered by stop_sequence.
    pub stop_times_by_trip: HashMap<String, Vec<TripStop>>,
    pub routes: HashMap<String, Route>,
    routes_by_stop: Vec<Vec<String>>,
    transfers: Vec<Vec<TransferEdge>>,
    pub service_date: NaiveDate,
}

/// The service date a query at `now` should route against.
pub fn active_service_date(now_local: DateTime<Tz>) -> NaiveDate {
    let today = now_local.date_naive();
    let (rollover_hour, rollover_minute) = SERVICE_DAY_ROLLOVER;
    if (now_local.hour(), now_local.minute()) < (rollover_hour, rollover_minute) {
        today.pred_opt().unwrap_or(today)
    } else {
        today
    }
}

impl Timetable {
    /// Build the routing timetable for the active service date from the
    /// synthesised stop times, falling back to the scheduled table when
    /// no synthesis result is available.
    pub fn build(
        schedule: &Schedule,
        realistic: &RealisticTable,
        now_local: DateTime<Tz>,
    ) -> Timetable {
        let service_date = active_service_date(now_local);

        let source: &HashMap<String, Vec<StopTime>> = if realistic.stop_times.is_empty() {
            &schedule.stop_times
        } else {
            &realistic.stop_times
        };

        let mut stops: Vec<TimetableStop> = schedule
            .stops
            .values()
            .map(|s| TimetableStop {
                stop_id: s.stop_id.clone(),
                stop_name: s.stop_name.clone(),
                lat: s.lat,
                lon: s.lon,
            })
            .collect();
        stops.sort_by(|a, b| a.stop_id.cmp(&b.stop_id));

        let mut trips = HashMap::new();
        let mut stop_times = HashMap::new();
        for (trip_id, trip) in &schedule.trips {
            if !schedule.operates_on(&trip.service_id, service_date) {
                continue;
            }
            let Some(rows) = source
                .get(trip_id)
                .or_else(|| schedule.stop_times.get(trip_id))
            else {
                continue;
            };
            if rows.is_empty() {
                continue;
            }
            trips.insert(trip_id.clone(), trip.clone());
            stop_times.insert(trip_id.clone(), rows.clone());
        }

        info!(
            service_date = %service_date,
            trips = trips.len(),
            stops = stops.len(),
            "Loading timetable for active service date"
        );

        Self::assemble(stops, trips, stop_times, schedule.routes.clone(), service_date)
    }

    /// Assemble the dense structures from already-filtered parts.
    pub fn assemble(
        stops: Vec<TimetableStop>,
        trips: HashMap<String, Trip>,
        stop_times: HashMap<String, Vec<StopTime>>,
        routes: HashMap<String, Route>,
        service_date: NaiveDate,
    ) -> Timetable {
        let stop_index: HashMap<String, usize> = stops
            .iter()
            .enumerate()
            .map(|(i, s)| (s.stop_id.clone(), i))
            .collect();

        let mut stop_times_by_trip: HashMap<String, Vec<TripStop>> = HashMap::new();
        let mut route_sets: Vec<HashSet<String>> = vec![HashSet::new(); stops.len()];
        for (trip_id, rows) in stop_times {
            let route_id = trips.get(&trip_id).map(|t| t.route_id.clone());
            let interned: Vec<TripStop> = rows
                .iter()
                .filter_map(|row| {
                    let stop = *stop_index.get(&row.stop_id)?;
                    if let Some(route_id) = &route_id {
                        route_sets[stop].insert(route_id.clone());
                    }
                    Some(TripStop {
                        stop,
                        stop_sequence: row.stop_sequence,
                        arrival_time: row.arrival_time,
                        departure_time: row.departure_time,
                    })
                })
                .collect();
            if !interned.is_empty() {
                stop_times_by_trip.insert(trip_id, interned);
            }
        }

        let routes_by_stop = route_sets
            .into_iter()
            .map(|set| {
                let mut ids: Vec<String> = set.into_iter().collect();
                ids.sort();
                ids
            })
            .collect();

        let transfers = build_transfer_graph(&stops);

        Timetable {
            stops,
            stop_index,
            trips,
            stop_times_by_trip,
            routes,
            routes_by_stop,
            transfers,
            service_date,
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn stop(&self, idx: usize) -> &TimetableStop {
        &self.stops[idx]
    }

    pub fn stop_idx(&self, stop_id: &str) -> Option<usize> {
        self.stop_index.get(stop_id).copied()
    }

    pub fn transfers_from(&self, idx: usize) -> &[TransferEdge] {
        &self.transfers[idx]
    }

    pub fn routes_through(&self, idx: usize) -> &[String] {
        &self.routes_by_stop[idx]
    }

    /// The closest stops within `max_distance_m` of a coordinate,
    /// nearest first, capped at `MAX_NEARBY_STOPS`.
    pub fn nearby_stops(&self, lat: f64, lon: f64, max_distance_m: f64) -> Vec<NearbyStop> {
        let mut nearby: Vec<NearbyStop> = self
            .stops
            .iter()
            .enumerate()
            .filter_map(|(idx, stop)| {
                let distance = haversine_distance_m(lat, lon, stop.lat, stop.lon);
                if distance <= max_distance_m {
                    Some(NearbyStop {
                        stop: idx,
                        distance_m: distance,
                        walk_seconds: walk_seconds(distance),
                    })
                } else {
                    None
                }
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        nearby.truncate(MAX_NEARBY_STOPS);
        nearby
    }
}

/// Bidirectional walking edges between all stop pairs within range.
/// Stops are swept in latitude order so each pair is only distance
/// checked when the cheap coordinate box admits it.
fn build_transfer_graph(stops: &[TimetableStop]) -> Vec<Vec<TransferEdge>> {
    let mut transfers: Vec<Vec<TransferEdge>> = vec![Vec::new(); stops.len()];

    let mut order: Vec<usize> = (0..stops.len()).collect();
    order.sort_by(|&a, &b| stops[a].lat.total_cmp(&stops[b].lat));

    let mut edges = 0usize;
    for i in 0..order.len() {
        let a = order[i];
        for &b in &order[i + 1..] {
            if stops[b].lat - stops[a].lat > BOX_PREFILTER_DEG {
                break;
            }
            if (stops[a].lon - stops[b].lon).abs() > BOX_PREFILTER_DEG {
                continue;
            }
            let distance = haversine_distance_m(stops[a].lat, stops[a].lon, stops[b].lat, stops[b].lon);
            if distance > MAX_WALK_TRANSFER_M {
                continue;
            }
            let duration_seconds = walk_seconds(distance);
            transfers[a].push(TransferEdge {
                to: b,
                duration_seconds,
                distance_m: distance,
            });
            transfers[b].push(TransferEdge {
                to: a,
                duration_seconds,
                distance_m: distance,
            });
            edges += 1;
        }
    }

    info!(stops = stops.len(), connections = edges, "Built transfer graph");
    transfers
}
