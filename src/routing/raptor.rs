//! Round-based journey search (RAPTOR) over the in-memory timetable.
//!
//! Round k holds the earliest known arrival at every stop using at most
//! k transit legs. Walking transfers live in the same round as the
//! transit leg that reached them and do not count as transfers.

use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::debug;

use crate::routing::timetable::{NearbyStop, Timetable};

/// Walking radius for reaching the first and leaving the last stop.
pub const MAX_WALKING_DISTANCE_M: f64 = 500.0;

/// At most this many itineraries are returned.
pub const MAX_RESULTS: usize = 5;

/// Maximum number of transfers between transit legs.
pub const MAX_TRANSFERS: usize = 3;

/// Rounds 0..=MAX_TRANSFERS+1: round 0 is "walked from origin only".
const ROUNDS: usize = MAX_TRANSFERS + 2;

/// Arrivals beyond this horizon after departure are not considered.
pub const SEARCH_WINDOW_SECS: i64 = 4 * 3600;

/// Boarding buffer applied when changing from a previous transit leg.
pub const TRANSFER_TIME_SECS: i64 = 180;

/// Itineraries within this of the fastest survive pruning.
const RESULT_TIME_SLACK_SECS: i64 = 60;

const HALF_DAY_SECS: i64 = 43_200;
const DAY_SECS: i64 = 86_400;

/// An endpoint of a leg: a raw coordinate (query origin/destination) or
/// a timetable stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Place {
    Coordinate { lat: f64, lon: f64 },
    Stop(usize),
}

#[derive(Debug, Clone)]
pub enum Leg {
    Walk {
        from: Place,
        to: Place,
        distance_m: f64,
        duration_seconds: i64,
    },
    Transit {
        route_id: String,
        trip_id: String,
        from_stop: usize,
        to_stop: usize,
        /// Raw timetable departure at the boarding stop.
        departure_seconds: i64,
        /// Raw timetable arrival at the alighting stop.
        arrival_seconds: i64,
    },
}

#[derive(Debug, Clone)]
pub struct Journey {
    pub total_seconds: i64,
    pub transit_legs: usize,
    pub legs: Vec<Leg>,
    pub dest_stop: usize,
}

/// Leg-reconstruction record stored alongside each label.
#[derive(Debug, Clone)]
enum Parent {
    WalkFromOrigin {
        distance_m: f64,
        walk_seconds: i64,
    },
    Transfer {
        from_stop: usize,
        walk_seconds: i64,
        distance_m: f64,
    },
    Transit {
        pattern: usize,
        trip: usize,
        boarding_index: usize,
        alight_index: usize,
    },
}

struct PatternTrip {
    trip_id: String,
    first_departure: i64,
    /// (arrival, departure) per pattern stop, raw timetable seconds.
    times: Vec<(i64, i64)>,
}

/// Trips sharing a route id and an identical ordered stop sequence,
/// ordered by first-stop departure.
struct Pattern {
    route_id: String,
    stop_hash: u64,
    stops: Vec<usize>,
    trips: Vec<PatternTrip>,
}

pub struct RaptorEngine {
    timetable: Arc<Timetable>,
    patterns: Vec<Pattern>,
}

impl RaptorEngine {
    pub fn new(timetable: Arc<Timetable>) -> Self {
        let patterns = build_patterns(&timetable);
        debug!(patterns = patterns.len(), "Grouped trips into route patterns");
        Self {
            timetable,
            patterns,
        }
    }

    /// Find up to `MAX_RESULTS` itineraries from an origin coordinate
    /// to a destination coordinate, departing at `departure_seconds` on
    /// the timetable's continuous time axis. Never fails; an empty
    /// result means no route within the search window.
    pub fn run(
        &self,
        origin: (f64, f64),
        destination: (f64, f64),
        departure_seconds: i64,
    ) -> Vec<Journey> {
        let tt = &*self.timetable;
        let origin_stops = tt.nearby_stops(origin.0, origin.1, MAX_WALKING_DISTANCE_M);
        let dest_stops = tt.nearby_stops(destination.0, destination.1, MAX_WALKING_DISTANCE_M);
        if origin_stops.is_empty() || dest_stops.is_empty() {
            return Vec::new();
        }

        let n = tt.stop_count();
        let idx = |stop: usize, round: usize| stop * ROUNDS + round;
        let mut tau = vec![i64::MAX; n * ROUNDS];
        let mut parent: Vec<Option<Parent>> = vec![None; n * ROUNDS];

        for o in &origin_stops {
            let arrival = departure_seconds + o.walk_seconds;
            if arrival < tau[idx(o.stop, 0)] {
                tau[idx(o.stop, 0)] = arrival;
                parent[idx(o.stop, 0)] = Some(Parent::WalkFromOrigin {
                    distance_m: o.distance_m,
                    walk_seconds: o.walk_seconds,
                });
            }
        }

        let window_end = departure_seconds + SEARCH_WINDOW_SECS;

        for k in 1..ROUNDS {
            let mut marked = vec![false; n];
            let mut any_marked = false;
            for s in 0..n {
                if tau[idx(s, k - 1)] != i64::MAX {
                    marked[s] = true;
                    any_marked = true;
                }
            }
            if !any_marked {
                break;
            }

            // Boarding directly after the origin walk needs no buffer;
            // changing off an earlier transit leg does.
            let buffer = if k >= 2 { TRANSFER_TIME_SECS } else { 0 };

            let mut improved = vec![false; n];

            // Transit phase: one best boarding per pattern, then relax
            // every stop after it.
            for (pi, pattern) in self.patterns.iter().enumerate() {
                if !pattern.stops.iter().any(|&s| marked[s]) {
                    continue;
                }

                let mut best: Option<(usize, usize, i64)> = None;
                for (ti, trip) in pattern.trips.iter().enumerate() {
                    for (i, &s) in pattern.stops.iter().enumerate() {
                        if !marked[s] {
                            continue;
                        }
                        let dep = normalize_time(
                            trip.times[i].1,
                            trip.first_departure,
                            departure_seconds,
                        );
                        if dep < tau[idx(s, k - 1)] + buffer {
                            continue;
                        }
                        if best.is_some_and(|(_, _, best_dep)| dep >= best_dep) {
                            continue;
                        }
                        best = Some((ti, i, dep));
                        break;
                    }
                }

                let Some((ti, boarding_index, _)) = best else {
                    continue;
                };
                let trip = &pattern.trips[ti];
                for i in boarding_index + 1..pattern.stops.len() {
                    let arr = normalize_time(
                        trip.times[i].0,
                        trip.first_departure,
                        departure_seconds,
                    );
                    if arr > window_end {
                        continue;
                    }
                    let s = pattern.stops[i];
                    if arr < tau[idx(s, k)] {
                        tau[idx(s, k)] = arr;
                        parent[idx(s, k)] = Some(Parent::Transit {
                            pattern: pi,
                            trip: ti,
                            boarding_index,
                            alight_index: i,
                        });
                        improved[s] = true;
                    }
                }
            }

            // Transfer phase: walk outward from every stop the transit
            // phase just improved.
            for s in 0..n {
                if !improved[s] {
                    continue;
                }
                let base = tau[idx(s, k)];
                for edge in tt.transfers_from(s) {
                    let candidate = base + edge.duration_seconds;
                    if candidate < tau[idx(edge.to, k)] {
                        tau[idx(edge.to, k)] = candidate;
                        parent[idx(edge.to, k)] = Some(Parent::Transfer {
                            from_stop: s,
                            walk_seconds: edge.duration_seconds,
                            distance_m: edge.distance_m,
                        });
                    }
                }
            }
        }

        // Collect destination labels inside the window, best first.
        let mut candidates: Vec<(i64, usize, &NearbyStop)> = Vec::new();
        for d in &dest_stops {
            for k in 0..ROUNDS {
                let t = tau[idx(d.stop, k)];
                if t != i64::MAX && t <= window_end {
                    candidates.push((t, k, d));
                }
            }
        }
        candidates.sort_by_key(|c| c.0);

        let mut raw: Vec<Journey> = Vec::new();
        for (arrival, k, dest) in candidates {
            let Some(journey) =
                self.reconstruct(&parent, origin, destination, departure_seconds, arrival, k, dest)
            else {
                continue;
            };
            raw.push(journey);
        }

        select_results(raw)
    }

    #[allow(clippy::too_many_arguments)]
    fn reconstruct(
        &self,
        parent: &[Option<Parent>],
        origin: (f64, f64),
        destination: (f64, f64),
        departure_seconds: i64,
        arrival: i64,
        k: usize,
        dest: &NearbyStop,
    ) -> Option<Journey> {
        let idx = |stop: usize, round: usize| stop * ROUNDS + round;
        let mut legs: Vec<Leg> = Vec::new();
        let mut cur = dest.stop;
        let mut round = k;

        loop {
            let Some(record) = &parent[idx(cur, round)] else {
                break;
            };
            match record {
                Parent::WalkFromOrigin {
                    distance_m,
                    walk_seconds,
                } => {
                    legs.insert(
                        0,
                        Leg::Walk {
                            from: Place::Coordinate {
                                lat: origin.0,
                                lon: origin.1,
                            },
                            to: Place::Stop(cur),
                            distance_m: *distance_m,
                            duration_seconds: *walk_seconds,
                        },
                    );
                    break;
                }
                Parent::Transfer {
                    from_stop,
                    walk_seconds,
                    distance_m,
                } => {
                    legs.insert(
                        0,
                        Leg::Walk {
                            from: Place::Stop(*from_stop),
                            to: Place::Stop(cur),
                            distance_m: *distance_m,
                            duration_seconds: *walk_seconds,
                        },
                    );
                    // Transfers live in the round of the transit leg
                    // that fed them.
                    cur = *from_stop;
                }
                Parent::Transit {
                    pattern,
                    trip,
                    boarding_index,
                    alight_index,
                } => {
                    let pat = &self.patterns[*pattern];
                    let tr = &pat.trips[*trip];
                    let boarding_stop = pat.stops[*boarding_index];
                    legs.insert(
                        0,
                        Leg::Transit {
                            route_id: pat.route_id.clone(),
                            trip_id: tr.trip_id.clone(),
                            from_stop: boarding_stop,
                            to_stop: cur,
                            departure_seconds: tr.times[*boarding_index].1,
                            arrival_seconds: tr.times[*alight_index].0,
                        },
                    );
                    cur = boarding_stop;
                    round = round.checked_sub(1)?;
                }
            }
        }

        legs.push(Leg::Walk {
            from: Place::Stop(dest.stop),
            to: Place::Coordinate {
                lat: destination.0,
                lon: destination.1,
            },
            distance_m: dest.distance_m,
            duration_seconds: dest.walk_seconds,
        });

        let legs = merge_consecutive_walks(legs);
        if has_adjacent_duplicate_route(&legs) {
            return None;
        }

        let total_seconds = arrival - departure_seconds + dest.walk_seconds;
        if total_seconds < 0 || total_seconds > SEARCH_WINDOW_SECS {
            return None;
        }

        let transit_legs = legs
            .iter()
            .filter(|leg| matches!(leg, Leg::Transit { .. }))
            .count();
        Some(Journey {
            total_seconds,
            transit_legs,
            legs,
            dest_stop: dest.stop,
        })
    }
}

fn build_patterns(timetable: &Timetable) -> Vec<Pattern> {
    let mut buckets: HashMap<(String, u64), Pattern> = HashMap::new();

    for (trip_id, rows) in &timetable.stop_times_by_trip {
        let Some(trip) = timetable.trips.get(trip_id) else {
            continue;
        };
        if rows.is_empty() {
            continue;
        }

        let stops: Vec<usize> = rows.iter().map(|r| r.stop).collect();
        let mut hasher = DefaultHasher::new();
        stops.hash(&mut hasher);
        let stop_hash = hasher.finish();

        let times: Vec<(i64, i64)> = rows
            .iter()
            .map(|r| (r.arrival_time as i64, r.departure_time as i64))
            .collect();
        let first_departure = times[0].1;

        buckets
            .entry((trip.route_id.clone(), stop_hash))
            .or_insert_with(|| Pattern {
                route_id: trip.route_id.clone(),
                stop_hash,
                stops,
                trips: Vec::new(),
            })
            .trips
            .push(PatternTrip {
                trip_id: trip_id.clone(),
                first_departure,
                times,
            });
    }

    let mut patterns: Vec<Pattern> = buckets.into_values().collect();
    for pattern in &mut patterns {
        pattern
            .trips
            .sort_by(|a, b| (a.first_departure, &a.trip_id).cmp(&(b.first_departure, &b.trip_id)));
    }
    // Fixed order keeps the search deterministic across processes.
    patterns.sort_by(|a, b| (&a.route_id, a.stop_hash).cmp(&(&b.route_id, b.stop_hash)));
    patterns
}

/// Lift a raw timetable time onto the query's continuous axis: past
/// midnight relative to the trip's own start, then relative to the
/// query departure.
fn normalize_time(raw: i64, first_departure: i64, query_departure: i64) -> i64 {
    let mut t = raw;
    if t < first_departure - HALF_DAY_SECS {
        t += DAY_SECS;
    }
    if t < query_departure - HALF_DAY_SECS {
        t += DAY_SECS;
    }
    t
}

/// Collapse runs of walk legs into one, summing distance and duration
/// and keeping the first origin and the last terminus.
fn merge_consecutive_walks(legs: Vec<Leg>) -> Vec<Leg> {
    let mut merged: Vec<Leg> = Vec::with_capacity(legs.len());
    for leg in legs {
        let incoming_walk = match &leg {
            Leg::Walk {
                to,
                distance_m,
                duration_seconds,
                ..
            } => Some((*to, *distance_m, *duration_seconds)),
            Leg::Transit { .. } => None,
        };

        if let Some((next_to, next_distance, next_duration)) = incoming_walk {
            if let Some(Leg::Walk {
                to,
                distance_m,
                duration_seconds,
                ..
            }) = merged.last_mut()
            {
                *to = next_to;
                *distance_m += next_distance;
                *duration_seconds += next_duration;
                continue;
            }
        }
        merged.push(leg);
    }
    merged
}

/// Two consecutive transit legs on the same real route id make the
/// itinerary nonsensical (alighting just to reboard the same line).
fn has_adjacent_duplicate_route(legs: &[Leg]) -> bool {
    let route_ids: Vec<&str> = legs
        .iter()
        .filter_map(|leg| match leg {
            Leg::Transit { route_id, .. } => Some(route_id.as_str()),
            Leg::Walk { .. } => None,
        })
        .collect();
    route_ids.windows(2).any(|pair| pair[0] == pair[1])
}

fn total_walk_seconds(journey: &Journey) -> i64 {
    journey
        .legs
        .iter()
        .map(|leg| match leg {
            Leg::Walk {
                duration_seconds, ..
            } => *duration_seconds,
            Leg::Transit { .. } => 0,
        })
        .sum()
}

/// Ordered transit signature: (route, boarding stop, alighting stop)
/// per transit leg.
fn transit_signature(journey: &Journey) -> Vec<(String, usize, usize)> {
    journey
        .legs
        .iter()
        .filter_map(|leg| match leg {
            Leg::Transit {
                route_id,
                from_stop,
                to_stop,
                ..
            } => Some((route_id.clone(), *from_stop, *to_stop)),
            Leg::Walk { .. } => None,
        })
        .collect()
}

/// Final selection over reconstructed itineraries (already sorted by
/// arrival): per transit signature keep the variant with the least
/// total walking, then keep itineraries close to the fastest or with
/// the fewest transit legs, capped at `MAX_RESULTS`.
fn select_results(raw: Vec<Journey>) -> Vec<Journey> {
    if raw.is_empty() {
        return raw;
    }

    let mut best_by_signature: HashMap<Vec<(String, usize, usize)>, usize> = HashMap::new();
    for (i, journey) in raw.iter().enumerate() {
        match best_by_signature.entry(transit_signature(journey)) {
            Entry::Vacant(entry) => {
                entry.insert(i);
            }
            Entry::Occupied(mut entry) => {
                if total_walk_seconds(journey) < total_walk_seconds(&raw[*entry.get()]) {
                    *entry.get_mut() = i;
                }
            }
        }
    }
    let mut kept: Vec<usize> = best_by_signature.into_values().collect();
    kept.sort_unstable();
    let deduped: Vec<&Journey> = kept.iter().map(|&i| &raw[i]).collect();

    let fastest = deduped.iter().map(|j| j.total_seconds).min().unwrap();
    let min_transit = deduped.iter().map(|j| j.transit_legs).min().unwrap();

    let mut results: Vec<Journey> = deduped
        .into_iter()
        .filter(|j| {
            j.total_seconds <= fastest + RESULT_TIME_SLACK_SECS || j.transit_legs == min_transit
        })
        .cloned()
        .collect();
    results.truncate(MAX_RESULTS);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs::static_data::{Route, StopTime, Trip, ROUTE_TYPE_BUS};
    use crate::routing::timetable::TimetableStop;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn secs(hms: &str) -> i64 {
        crate::gtfs::static_data::parse_gtfs_time(hms).unwrap() as i64
    }

    struct Fixture {
        stops: Vec<TimetableStop>,
        trips: HashMap<String, Trip>,
        stop_times: HashMap<String, Vec<StopTime>>,
        routes: HashMap<String, Route>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                stops: Vec::new(),
                trips: HashMap::new(),
                stop_times: HashMap::new(),
                routes: HashMap::new(),
            }
        }

        fn stop(mut self, id: &str, lat: f64, lon: f64) -> Self {
            self.stops.push(TimetableStop {
                stop_id: id.to_string(),
                stop_name: format!("Stop {id}"),
                lat,
                lon,
            });
            self
        }

        fn trip(mut self, trip_id: &str, route_id: &str, stops: &[(&str, &str)]) -> Self {
            self.routes.entry(route_id.to_string()).or_insert(Route {
                route_id: route_id.to_string(),
                short_name: Some(route_id.to_string()),
                long_name: None,
                route_type: ROUTE_TYPE_BUS,
            });
            self.trips.insert(
                trip_id.to_string(),
                Trip {
                    trip_id: trip_id.to_string(),
                    route_id: route_id.to_string(),
                    service_id: "S".to_string(),
                    headsign: None,
                    direction_id: None,
                },
            );
            let rows = stops
                .iter()
                .enumerate()
                .map(|(i, (stop_id, time))| StopTime {
                    stop_sequence: i as u32 + 1,
                    stop_id: stop_id.to_string(),
                    arrival_time: secs(time) as i32,
                    departure_time: secs(time) as i32,
                })
                .collect();
            self.stop_times.insert(trip_id.to_string(), rows);
            self
        }

        fn engine(self) -> RaptorEngine {
            let tt = Timetable::assemble(
                self.stops,
                self.trips,
                self.stop_times,
                self.routes,
                NaiveDate::from_ymd_opt(2026, 7, 11).unwrap(),
            );
            RaptorEngine::new(Arc::new(tt))
        }
    }

    fn walk_legs(journey: &Journey) -> usize {
        journey
            .legs
            .iter()
            .filter(|l| matches!(l, Leg::Walk { .. }))
            .count()
    }

    #[test]
    fn direct_trip_boardable_at_departure_time() {
        // Single trip from A to C; the rider is standing at A when it
        // leaves. One route, one transit leg, no transfers.
        let engine = Fixture::new()
            .stop("A", 0.0, 0.0)
            .stop("B", 0.0, 0.004)
            .stop("C", 0.0, 0.010)
            .trip("T1", "R1", &[("A", "10:00:00"), ("C", "10:10:00")])
            .engine();

        let results = engine.run((0.0, 0.0), (0.0, 0.010), secs("10:00:00"));
        assert_eq!(results.len(), 1);

        let journey = &results[0];
        assert_eq!(journey.transit_legs, 1);
        assert_eq!(journey.total_seconds, 600);
        assert_eq!(journey.legs.len(), 3);
        assert!(matches!(journey.legs[0], Leg::Walk { .. }));
        assert!(
            matches!(&journey.legs[1], Leg::Transit { route_id, .. } if route_id == "R1")
        );
        assert!(matches!(journey.legs[2], Leg::Walk { .. }));
    }

    #[test]
    fn two_leg_journey_with_transfer_buffer() {
        // R1 arrives at B 10:05, R2 leaves B 10:10: the 180 s change
        // buffer fits. Origin is ~84 m (60 s walk) from A.
        let engine = Fixture::new()
            .stop("A", 0.0, 0.0)
            .stop("B", 0.1, 0.0)
            .stop("C", 0.2, 0.0)
            .trip("T1", "R1", &[("A", "10:00:00"), ("B", "10:05:00")])
            .trip("T2", "R2", &[("B", "10:10:00"), ("C", "10:20:00")])
            .engine();

        let origin = (0.0, 0.000755);
        let results = engine.run(origin, (0.2, 0.0), secs("09:58:00"));
        assert_eq!(results.len(), 1);

        let journey = &results[0];
        assert_eq!(journey.transit_legs, 2);
        assert_eq!(journey.total_seconds, 22 * 60);
        match &journey.legs[0] {
            Leg::Walk {
                duration_seconds, ..
            } => assert_eq!(*duration_seconds, 60),
            other => panic!("expected walk leg, got {other:?}"),
        }
    }

    #[test]
    fn transfer_buffer_rejects_tight_connection() {
        // R2 leaves B only 100 s after R1 arrives: not boardable with
        // the 180 s buffer, so no journey to C exists.
        let engine = Fixture::new()
            .stop("A", 0.0, 0.0)
            .stop("B", 0.1, 0.0)
            .stop("C", 0.2, 0.0)
            .trip("T1", "R1", &[("A", "10:00:00"), ("B", "10:05:00")])
            .trip("T2", "R2", &[("B", "10:06:40"), ("C", "10:20:00")])
            .engine();

        let results = engine.run((0.0, 0.0), (0.2, 0.0), secs("09:58:00"));
        assert!(results.is_empty());
    }

    #[test]
    fn after_midnight_trip_routable_from_early_morning_query() {
        // A 25:30 departure on yesterday's service day, queried at
        // 00:15 which sits at 24:15 on the same axis.
        let engine = Fixture::new()
            .stop("A", 0.0, 0.0)
            .stop("C", 0.2, 0.0)
            .trip("T1", "R1", &[("A", "25:30:00"), ("C", "25:40:00")])
            .engine();

        let departure = secs("00:15:00") + DAY_SECS;
        let results = engine.run((0.0, 0.0), (0.2, 0.0), departure);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].total_seconds, secs("25:40:00") - departure);
    }

    #[test]
    fn arrivals_beyond_search_window_are_ignored() {
        let engine = Fixture::new()
            .stop("A", 0.0, 0.0)
            .stop("C", 0.2, 0.0)
            .trip("T1", "R1", &[("A", "15:00:00"), ("C", "15:10:00")])
            .engine();

        // Departing at 10:00, the 15:10 arrival is past the 4 h window.
        let results = engine.run((0.0, 0.0), (0.2, 0.0), secs("10:00:00"));
        assert!(results.is_empty());
    }

    #[test]
    fn later_trip_on_same_pattern_is_picked_when_first_is_missed() {
        let engine = Fixture::new()
            .stop("A", 0.0, 0.0)
            .stop("C", 0.2, 0.0)
            .trip("T1", "R1", &[("A", "09:00:00"), ("C", "09:10:00")])
            .trip("T2", "R1", &[("A", "10:30:00"), ("C", "10:40:00")])
            .engine();

        let results = engine.run((0.0, 0.0), (0.2, 0.0), secs("10:00:00"));
        assert_eq!(results.len(), 1);
        match &results[0].legs[1] {
            Leg::Transit { trip_id, .. } => assert_eq!(trip_id, "T2"),
            other => panic!("expected transit leg, got {other:?}"),
        }
    }

    #[test]
    fn walking_transfer_bridges_nearby_stops() {
        // R1 ends at B1; B2 is ~445 m away; R2 leaves from B2. The
        // transfer edge makes the connection without spending a round.
        let engine = Fixture::new()
            .stop("A", 0.1, 0.0)
            .stop("B1", 0.0, 0.0)
            .stop("B2", 0.0, 0.004)
            .stop("C", 0.2, 0.004)
            .trip("T1", "R1", &[("A", "10:00:00"), ("B1", "10:05:00")])
            .trip("T2", "R2", &[("B2", "10:20:00"), ("C", "10:30:00")])
            .engine();

        let results = engine.run((0.1, 0.0), (0.2, 0.004), secs("09:59:00"));
        assert_eq!(results.len(), 1);
        let journey = &results[0];
        assert_eq!(journey.transit_legs, 2);
        // origin walk, R1, transfer walk, R2, destination walk
        assert_eq!(journey.legs.len(), 5);
        assert_eq!(walk_legs(journey), 3);
    }

    #[test]
    fn engine_is_deterministic() {
        let build = || {
            Fixture::new()
                .stop("A", 0.0, 0.0)
                .stop("B", 0.1, 0.0)
                .stop("C", 0.2, 0.0)
                .trip("T1", "R1", &[("A", "10:00:00"), ("B", "10:05:00")])
                .trip("T2", "R2", &[("B", "10:10:00"), ("C", "10:20:00")])
                .trip("T3", "R3", &[("A", "10:01:00"), ("C", "10:21:00")])
                .engine()
        };

        let a = build().run((0.0, 0.0), (0.2, 0.0), secs("09:58:00"));
        let b = build().run((0.0, 0.0), (0.2, 0.0), secs("09:58:00"));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.total_seconds, y.total_seconds);
            assert_eq!(x.transit_legs, y.transit_legs);
            assert_eq!(transit_signature(x), transit_signature(y));
        }
    }

    #[test]
    fn normalize_time_lifts_past_midnight_values() {
        // A time far below the trip's first departure is a wrapped
        // after-midnight value.
        assert_eq!(normalize_time(secs("00:10:00"), secs("23:50:00"), secs("23:45:00")), secs("24:10:00"));
        // Already consistent times pass through.
        assert_eq!(normalize_time(secs("10:00:00"), secs("09:50:00"), secs("09:45:00")), secs("10:00:00"));
        // A time consistent with its trip but far below the query
        // departure lifts one day.
        assert_eq!(
            normalize_time(secs("01:30:00"), secs("01:00:00"), secs("24:15:00")),
            secs("25:30:00")
        );
    }

    fn walk(duration: i64) -> Leg {
        Leg::Walk {
            from: Place::Coordinate { lat: 0.0, lon: 0.0 },
            to: Place::Coordinate { lat: 0.0, lon: 0.0 },
            distance_m: duration as f64 * 1.4,
            duration_seconds: duration,
        }
    }

    fn transit(route_id: &str, from: usize, to: usize) -> Leg {
        Leg::Transit {
            route_id: route_id.to_string(),
            trip_id: format!("{route_id}-trip"),
            from_stop: from,
            to_stop: to,
            departure_seconds: 0,
            arrival_seconds: 0,
        }
    }

    fn journey(total: i64, legs: Vec<Leg>) -> Journey {
        let transit_legs = legs
            .iter()
            .filter(|l| matches!(l, Leg::Transit { .. }))
            .count();
        Journey {
            total_seconds: total,
            transit_legs,
            legs,
            dest_stop: 0,
        }
    }

    #[test]
    fn consecutive_walks_merge_into_one() {
        let legs = merge_consecutive_walks(vec![
            walk(60),
            walk(30),
            transit("R1", 0, 1),
            walk(10),
        ]);
        assert_eq!(legs.len(), 3);
        match &legs[0] {
            Leg::Walk {
                duration_seconds,
                distance_m,
                ..
            } => {
                assert_eq!(*duration_seconds, 90);
                assert!((*distance_m - 126.0).abs() < 1e-9);
            }
            other => panic!("expected walk leg, got {other:?}"),
        }
    }

    #[test]
    fn adjacent_same_route_legs_are_detected_across_walks() {
        let same = vec![
            walk(10),
            transit("R1", 0, 1),
            walk(20),
            transit("R1", 2, 3),
            walk(10),
        ];
        assert!(has_adjacent_duplicate_route(&same));

        let different = vec![walk(10), transit("R1", 0, 1), transit("R2", 1, 2)];
        assert!(!has_adjacent_duplicate_route(&different));
    }

    #[test]
    fn shared_signature_keeps_least_walking_variant() {
        let slow_walk = journey(1500, vec![walk(300), transit("R1", 0, 1), transit("R2", 1, 2)]);
        let fast_walk = journey(1460, vec![walk(260), transit("R1", 0, 1), transit("R2", 1, 2)]);

        let results = select_results(vec![fast_walk, slow_walk]);
        assert_eq!(results.len(), 1);
        assert_eq!(total_walk_seconds(&results[0]), 260);
    }

    #[test]
    fn pruning_keeps_fast_and_few_transfer_results() {
        // (1200 s, 2 legs), (1250 s, 1 leg), (1300 s, 3 legs):
        // threshold is 1260 and the leg minimum is 1, so the third
        // candidate is dropped.
        let a = journey(1200, vec![walk(10), transit("R1", 0, 1), transit("R2", 1, 2)]);
        let b = journey(1250, vec![walk(10), transit("R3", 0, 2)]);
        let c = journey(
            1300,
            vec![
                walk(10),
                transit("R4", 0, 1),
                transit("R5", 1, 2),
                transit("R6", 2, 3),
            ],
        );

        let results = select_results(vec![a, b, c]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].total_seconds, 1200);
        assert_eq!(results[1].total_seconds, 1250);
    }

    #[test]
    fn at_most_five_results_are_returned() {
        let mut raw = Vec::new();
        for i in 0..8 {
            raw.push(journey(
                1000 + i,
                vec![walk(10), transit(&format!("R{i}"), 0, 1)],
            ));
        }
        let results = select_results(raw);
        assert_eq!(results.len(), MAX_RESULTS);
    }
}
