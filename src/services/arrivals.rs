//! Upcoming arrivals at a stop, merging the static schedule with live
//! vehicle positions, observed arrivals, and the synthesised timetable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::gtfs::realtime::{fetch_tracked_vehicles, TrackedVehicle, REQUEST_TIMEOUT};
use crate::gtfs::static_data::{format_gtfs_time, Route, StopTime, Trip};
use crate::gtfs::Schedule;
use crate::realistic::RealisticTable;
use crate::routing::timetable::active_service_date;
use crate::sync::{ArrivalObserver, LatestArrival};

/// Threshold in minutes to consider a bus a ghost when no realtime
/// info is present. Retained for tuning; the route-level filter below
/// keys on later realtime runs instead.
#[allow(dead_code)]
pub const REALTIME_GRACE_MINUTES: i64 = 7;

/// How long a cached vehicle position is trusted.
pub const VEHICLE_POSITION_TTL: Duration = Duration::from_secs(30);

/// Cached positions older than this are dropped outright.
pub const VEHICLE_POSITION_DROP: Duration = Duration::from_secs(300);

/// Schedule window around now: an hour back (late vehicles), two hours
/// ahead.
const LOOKBACK_SECS: i64 = 3600;
const LOOKAHEAD_SECS: i64 = 7200;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VehiclePositionDoc {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StopArrivalDoc {
    pub trip_id: String,
    pub route_id: String,
    /// Rider-facing route id (type prefix + short name).
    pub real_life_route_id: Option<String>,
    pub stop_id: String,
    pub stop_sequence: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headsign: Option<String>,
    pub scheduled_arrival_time: String,
    pub expected_arrival_time: String,
    /// "realtime" when backed by an observation or live position,
    /// "scheduled" otherwise.
    pub certainty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<i64>,
    /// "late" above +60 s observed delay, "early" below -60 s,
    /// "on time" otherwise.
    pub schedule_relationship: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historic_latency_minutes: Option<i64>,
    pub historic_relationship: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_position: Option<VehiclePositionDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
}

struct CachedVehicle {
    vehicle: TrackedVehicle,
    last_seen: Instant,
}

pub struct StopArrivalsService {
    schedule: Arc<Schedule>,
    realistic: Arc<RealisticTable>,
    observer: Arc<ArrivalObserver>,
    client: reqwest::Client,
    feed_url: String,
    tz: Tz,
    vehicle_cache: Mutex<HashMap<String, CachedVehicle>>,
}

impl StopArrivalsService {
    pub fn new(
        schedule: Arc<Schedule>,
        realistic: Arc<RealisticTable>,
        observer: Arc<ArrivalObserver>,
        feed_url: String,
        tz: Tz,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            schedule,
            realistic,
            observer,
            client,
            feed_url,
            tz,
            vehicle_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Upcoming arrivals at the stop, or None when the stop id is
    /// unknown. Metro stops are served straight from the schedule; for
    /// everything else a feed failure degrades to cached positions.
    pub async fn arrivals_at(&self, stop_id: &str) -> Option<Vec<StopArrivalDoc>> {
        if !self.schedule.stops.contains_key(stop_id) {
            return None;
        }

        let now = chrono::Utc::now().with_timezone(&self.tz);

        if is_metro_stop_code(stop_id) {
            return Some(metro_arrivals(
                &self.schedule,
                &self.realistic,
                stop_id,
                schedule_axis_seconds(now),
            ));
        }

        match fetch_tracked_vehicles(&self.client, &self.feed_url).await {
            Ok(positions) => {
                let mut cache = self.vehicle_cache.lock().unwrap();
                update_vehicle_cache(&mut cache, positions, Instant::now());
            }
            Err(e) => {
                warn!(error = %e, "Vehicle positions fetch failed, serving cached positions");
            }
        }

        Some(self.assemble(stop_id, now))
    }

    fn assemble(&self, stop_id: &str, now: DateTime<Tz>) -> Vec<StopArrivalDoc> {
        let service_date = active_service_date(now);
        let now_secs = schedule_axis_seconds(now);

        let Some(trip_ids) = self.schedule.trips_by_stop.get(stop_id) else {
            return Vec::new();
        };

        let mut docs = Vec::new();
        for trip_id in trip_ids {
            let Some(trip) = self.schedule.trips.get(trip_id) else {
                continue;
            };
            if !self.schedule.operates_on(&trip.service_id, service_date) {
                continue;
            }
            let Some(rows) = self.schedule.stop_times.get(trip_id) else {
                continue;
            };

            let vehicle = self.fresh_vehicle(trip_id);
            let latest = self.observer.latest_arrival(trip_id);
            let route = self.schedule.routes.get(&trip.route_id);

            for row in rows.iter().filter(|r| r.stop_id == stop_id) {
                let arrival = row.arrival_time as i64;
                if arrival < now_secs - LOOKBACK_SECS || arrival > now_secs + LOOKAHEAD_SECS {
                    continue;
                }
                let historic = historic_latency_minutes(&self.realistic, trip_id, row);
                if let Some(doc) = assemble_arrival(
                    trip,
                    route,
                    row,
                    vehicle.as_ref(),
                    latest.as_ref(),
                    historic,
                    now_secs,
                ) {
                    docs.push(doc);
                }
            }
        }

        let mut docs = filter_ghosts_by_route(docs);
        docs.sort_by(|a, b| a.scheduled_arrival_time.cmp(&b.scheduled_arrival_time));
        docs
    }

    fn fresh_vehicle(&self, trip_id: &str) -> Option<TrackedVehicle> {
        let cache = self.vehicle_cache.lock().unwrap();
        cache
            .get(trip_id)
            .filter(|c| Instant::now().duration_since(c.last_seen) <= VEHICLE_POSITION_TTL)
            .map(|c| c.vehicle.clone())
    }
}

/// Clock seconds on the active service day's continuous axis: before
/// the rollover a 00:15 wall clock reads as 24:15.
fn schedule_axis_seconds(now: DateTime<Tz>) -> i64 {
    let mut secs = (now.hour() * 3600 + now.minute() * 60 + now.second()) as i64;
    if active_service_date(now) != now.date_naive() {
        secs += 86_400;
    }
    secs
}

/// Metro stop codes are an 'M' followed by digits, e.g. "M1" or "M312".
fn is_metro_stop_code(stop_id: &str) -> bool {
    let mut chars = stop_id.chars();
    matches!(chars.next(), Some('M') | Some('m'))
        && stop_id.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}

/// Metro arrivals come straight from the schedule: no vehicle feed, no
/// observer enrichment, no ghost filtering. Every future row is shown
/// as scheduled, with only the historic latency attached.
fn metro_arrivals(
    schedule: &Schedule,
    realistic: &RealisticTable,
    stop_id: &str,
    now_secs: i64,
) -> Vec<StopArrivalDoc> {
    let Some(trip_ids) = schedule.trips_by_stop.get(stop_id) else {
        return Vec::new();
    };

    let mut docs = Vec::new();
    for trip_id in trip_ids {
        let Some(trip) = schedule.trips.get(trip_id) else {
            continue;
        };
        let Some(rows) = schedule.stop_times.get(trip_id) else {
            continue;
        };
        let route = schedule.routes.get(&trip.route_id);

        for row in rows.iter().filter(|r| r.stop_id == stop_id) {
            if row.arrival_time as i64 - now_secs <= 0 {
                continue;
            }
            let historic = historic_latency_minutes(realistic, trip_id, row);
            docs.push(StopArrivalDoc {
                trip_id: trip.trip_id.clone(),
                route_id: trip.route_id.clone(),
                real_life_route_id: route.and_then(|r| r.external_id()),
                stop_id: row.stop_id.clone(),
                stop_sequence: row.stop_sequence,
                headsign: trip.headsign.clone(),
                scheduled_arrival_time: format_gtfs_time(row.arrival_time),
                expected_arrival_time: format_gtfs_time(row.arrival_time),
                certainty: "scheduled".to_string(),
                delay_seconds: None,
                schedule_relationship: "on time".to_string(),
                historic_latency_minutes: historic,
                historic_relationship: historic_relationship(historic).to_string(),
                vehicle_position: None,
                vehicle_id: None,
            });
        }
    }

    docs.sort_by(|a, b| a.scheduled_arrival_time.cmp(&b.scheduled_arrival_time));
    docs
}

/// Minutes the synthesised timetable sits behind (positive) or ahead
/// of (negative) the published schedule for this row.
fn historic_latency_minutes(
    realistic: &RealisticTable,
    trip_id: &str,
    row: &StopTime,
) -> Option<i64> {
    let rows = realistic.stop_times.get(trip_id)?;
    let synthesised = rows
        .iter()
        .find(|r| r.stop_sequence == row.stop_sequence && r.stop_id == row.stop_id)?;
    let diff = (synthesised.arrival_time - row.arrival_time) as f64;
    Some((diff / 60.0).round() as i64)
}

/// Insert the freshly fetched positions and drop entries unseen for
/// too long.
fn update_vehicle_cache(
    cache: &mut HashMap<String, CachedVehicle>,
    positions: HashMap<String, TrackedVehicle>,
    now: Instant,
) {
    for (trip_id, vehicle) in positions {
        cache.insert(
            trip_id,
            CachedVehicle {
                vehicle,
                last_seen: now,
            },
        );
    }
    cache.retain(|_, c| now.duration_since(c.last_seen) < VEHICLE_POSITION_DROP);
}

/// Build one arrival row, or None when the row should not be shown:
/// the vehicle already passed the stop, or the scheduled time is gone
/// with no observation.
fn assemble_arrival(
    trip: &Trip,
    route: Option<&Route>,
    row: &StopTime,
    vehicle: Option<&TrackedVehicle>,
    latest: Option<&LatestArrival>,
    historic_latency_minutes: Option<i64>,
    now_secs: i64,
) -> Option<StopArrivalDoc> {
    let has_vehicle = vehicle.is_some();
    let seconds_until = row.arrival_time as i64 - now_secs;

    let mut delay_seconds = None;
    let certainty = match latest {
        Some(latest) => {
            if latest.stop_sequence > row.stop_sequence {
                // Already served this stop.
                return None;
            }
            delay_seconds = latest.delay_seconds;
            if latest.stop_sequence == row.stop_sequence && seconds_until <= 0 {
                return None;
            }
            "realtime"
        }
        None => {
            // No observation for the trip: trust the schedule while
            // the arrival is still ahead.
            if seconds_until <= 0 {
                return None;
            }
            if has_vehicle {
                "realtime"
            } else {
                "scheduled"
            }
        }
    };

    let expected_arrival_time = match delay_seconds {
        Some(delay) => format_gtfs_time((row.arrival_time as i64 + delay).max(0) as i32),
        None => format_gtfs_time(row.arrival_time),
    };

    Some(StopArrivalDoc {
        trip_id: trip.trip_id.clone(),
        route_id: trip.route_id.clone(),
        real_life_route_id: route.and_then(|r| r.external_id()),
        stop_id: row.stop_id.clone(),
        stop_sequence: row.stop_sequence,
        headsign: trip.headsign.clone(),
        scheduled_arrival_time: format_gtfs_time(row.arrival_time),
        expected_arrival_time,
        certainty: certainty.to_string(),
        delay_seconds,
        schedule_relationship: schedule_relationship(delay_seconds).to_string(),
        historic_latency_minutes,
        historic_relationship: historic_relationship(historic_latency_minutes).to_string(),
        vehicle_position: vehicle.map(|v| VehiclePositionDoc {
            lat: v.lat,
            lon: v.lon,
            speed: v.speed,
            vehicle_id: v.vehicle_id.clone(),
        }),
        vehicle_id: vehicle.and_then(|v| v.vehicle_id.clone()),
    })
}

/// Observed delay against the schedule: more than a minute behind is
/// late, more than a minute ahead is early.
fn schedule_relationship(delay_seconds: Option<i64>) -> &'static str {
    match delay_seconds {
        Some(delay) if delay > 60 => "late",
        Some(delay) if delay < -60 => "early",
        _ => "on time",
    }
}

fn historic_relationship(latency_minutes: Option<i64>) -> &'static str {
    match latency_minutes {
        Some(minutes) if minutes > 1 => "late",
        Some(minutes) if minutes < -1 => "early",
        _ => "on time",
    }
}

/// Route-level ghost filtering. Within one route's arrivals in
/// scheduled order: a route with no realtime row at all is trusted
/// as-is, and a schedule-only row is dropped when a realtime row with
/// a later scheduled time exists on the route (a live vehicle behind
/// it means the earlier run never materialised). The rule is heuristic
/// and observation dependent.
fn filter_ghosts_by_route(arrivals: Vec<StopArrivalDoc>) -> Vec<StopArrivalDoc> {
    let mut by_route: HashMap<String, Vec<StopArrivalDoc>> = HashMap::new();
    for arrival in arrivals {
        by_route
            .entry(arrival.route_id.clone())
            .or_default()
            .push(arrival);
    }

    let mut filtered = Vec::new();
    for (_, mut group) in by_route {
        group.sort_by(|a, b| a.scheduled_arrival_time.cmp(&b.scheduled_arrival_time));

        if !group.iter().any(|a| a.certainty == "realtime") {
            filtered.extend(group);
            continue;
        }

        for i in 0..group.len() {
            if group[i].certainty == "realtime" {
                filtered.push(group[i].clone());
                continue;
            }
            let has_realtime_after = group[i + 1..].iter().any(|later| {
                later.certainty == "realtime"
                    && later.scheduled_arrival_time > group[i].scheduled_arrival_time
            });
            if !has_realtime_after {
                filtered.push(group[i].clone());
            }
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs::static_data::ROUTE_TYPE_BUS;

    fn trip() -> Trip {
        Trip {
            trip_id: "T1".into(),
            route_id: "R1".into(),
            service_id: "S".into(),
            headsign: Some("Centre".into()),
            direction_id: Some(0),
        }
    }

    fn route() -> Route {
        Route {
            route_id: "R1".into(),
            short_name: Some("84".into()),
            long_name: None,
            route_type: ROUTE_TYPE_BUS,
        }
    }

    fn row(seq: u32, arrival: i32) -> StopTime {
        StopTime {
            stop_sequence: seq,
            stop_id: "S1".into(),
            arrival_time: arrival,
            departure_time: arrival,
        }
    }

    fn latest(seq: u32, delay: Option<i64>) -> LatestArrival {
        LatestArrival {
            trip_id: "T1".into(),
            route_id: Some("R1".into()),
            stop_id: "X".into(),
            stop_name: "Observed".into(),
            stop_sequence: seq,
            timestamp: "2026-07-11 10:00:00 EEST".into(),
            delay_seconds: delay,
        }
    }

    fn vehicle() -> TrackedVehicle {
        TrackedVehicle {
            trip_id: "T1".into(),
            route_id: Some("R1".into()),
            vehicle_id: Some("bus-7".into()),
            lat: 42.7,
            lon: 23.3,
            speed: None,
        }
    }

    #[test]
    fn stop_already_passed_is_skipped() {
        // The observer saw the vehicle at sequence 5; this row is
        // sequence 3.
        let doc = assemble_arrival(
            &trip(),
            None,
            &row(3, 36_000),
            None,
            Some(&latest(5, Some(30))),
            None,
            35_000,
        );
        assert!(doc.is_none());
    }

    #[test]
    fn upcoming_stop_with_observation_is_realtime_with_expected_time() {
        // Vehicle observed two stops earlier, running 120 s late:
        // shown as realtime, late, with the delay applied.
        let doc = assemble_arrival(
            &trip(),
            Some(&route()),
            &row(5, 36_000),
            None,
            Some(&latest(3, Some(120))),
            None,
            35_000,
        )
        .unwrap();
        assert_eq!(doc.certainty, "realtime");
        assert_eq!(doc.delay_seconds, Some(120));
        assert_eq!(doc.scheduled_arrival_time, "10:00:00");
        assert_eq!(doc.expected_arrival_time, "10:02:00");
        assert_eq!(doc.schedule_relationship, "late");
        assert_eq!(doc.real_life_route_id.as_deref(), Some("A84"));
    }

    #[test]
    fn late_vehicle_keeps_row_past_its_scheduled_time() {
        // Scheduled time already passed, but the vehicle is still
        // upstream of this stop.
        let doc = assemble_arrival(
            &trip(),
            None,
            &row(5, 36_000),
            None,
            Some(&latest(3, Some(600))),
            None,
            36_300,
        );
        assert!(doc.is_some());
    }

    #[test]
    fn vehicle_standing_at_the_stop_past_schedule_is_dropped() {
        let doc = assemble_arrival(
            &trip(),
            None,
            &row(5, 36_000),
            None,
            Some(&latest(5, Some(60))),
            None,
            36_300,
        );
        assert!(doc.is_none());
    }

    #[test]
    fn unobserved_past_arrival_is_dropped() {
        let doc = assemble_arrival(&trip(), None, &row(1, 36_000), None, None, None, 36_100);
        assert!(doc.is_none());
    }

    #[test]
    fn unobserved_future_arrival_is_kept_as_scheduled() {
        // Due in five minutes with nothing on the road: still listed
        // as scheduled; route-level ghost filtering decides later.
        let doc = assemble_arrival(&trip(), None, &row(1, 36_000), None, None, None, 35_700).unwrap();
        assert_eq!(doc.certainty, "scheduled");
        assert!(doc.vehicle_position.is_none());

        // The same row with a live vehicle is realtime.
        let doc =
            assemble_arrival(&trip(), None, &row(1, 36_000), Some(&vehicle()), None, None, 35_700)
                .unwrap();
        assert_eq!(doc.certainty, "realtime");
        assert_eq!(doc.vehicle_id.as_deref(), Some("bus-7"));
    }

    #[test]
    fn schedule_relationship_uses_one_minute_band() {
        assert_eq!(schedule_relationship(Some(61)), "late");
        assert_eq!(schedule_relationship(Some(60)), "on time");
        assert_eq!(schedule_relationship(Some(-60)), "on time");
        assert_eq!(schedule_relationship(Some(-61)), "early");
        assert_eq!(schedule_relationship(None), "on time");
    }

    #[test]
    fn historic_relationship_uses_one_minute_band() {
        assert_eq!(historic_relationship(Some(2)), "late");
        assert_eq!(historic_relationship(Some(1)), "on time");
        assert_eq!(historic_relationship(Some(-1)), "on time");
        assert_eq!(historic_relationship(Some(-2)), "early");
        assert_eq!(historic_relationship(None), "on time");
    }

    fn plain_doc(route_id: &str, scheduled: &str, certainty: &str) -> StopArrivalDoc {
        StopArrivalDoc {
            trip_id: format!("{route_id}-{scheduled}"),
            route_id: route_id.to_string(),
            real_life_route_id: None,
            stop_id: "S1".into(),
            stop_sequence: 1,
            headsign: None,
            scheduled_arrival_time: scheduled.to_string(),
            expected_arrival_time: scheduled.to_string(),
            certainty: certainty.to_string(),
            delay_seconds: None,
            schedule_relationship: "on time".into(),
            historic_latency_minutes: None,
            historic_relationship: "on time".into(),
            vehicle_position: None,
            vehicle_id: None,
        }
    }

    #[test]
    fn ghost_filter_drops_scheduled_rows_with_realtime_behind_them() {
        // A live vehicle scheduled later than the 10:00 run means that
        // run never materialised; the 10:20 run has nothing realtime
        // behind it and stays.
        let docs = vec![
            plain_doc("R1", "10:00:00", "scheduled"),
            plain_doc("R1", "10:10:00", "realtime"),
            plain_doc("R1", "10:20:00", "scheduled"),
            plain_doc("R2", "10:15:00", "scheduled"),
        ];
        let mut filtered = filter_ghosts_by_route(docs);
        filtered.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));

        let ids: Vec<&str> = filtered.iter().map(|d| d.trip_id.as_str()).collect();
        assert_eq!(ids, vec!["R1-10:10:00", "R1-10:20:00", "R2-10:15:00"]);
    }

    #[test]
    fn ghost_filter_trusts_routes_without_any_realtime() {
        let docs = vec![
            plain_doc("R1", "10:00:00", "scheduled"),
            plain_doc("R1", "10:20:00", "scheduled"),
        ];
        let filtered = filter_ghosts_by_route(docs);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn metro_stop_codes_are_a_letter_and_digits() {
        assert!(is_metro_stop_code("M1"));
        assert!(is_metro_stop_code("M312"));
        assert!(is_metro_stop_code("m7"));
        assert!(!is_metro_stop_code("M"));
        assert!(!is_metro_stop_code("M1a"));
        assert!(!is_metro_stop_code("B5"));
        assert!(!is_metro_stop_code(""));
    }

    #[test]
    fn metro_arrivals_are_schedule_only_and_future_only() {
        use crate::gtfs::static_data::Stop;

        let mut stops = HashMap::new();
        stops.insert(
            "M312".to_string(),
            Stop {
                stop_id: "M312".into(),
                stop_name: "Metro Station".into(),
                lat: 42.7,
                lon: 23.3,
            },
        );
        let mut trips = HashMap::new();
        trips.insert(
            "MT1".to_string(),
            Trip {
                trip_id: "MT1".into(),
                route_id: "R1".into(),
                service_id: "S".into(),
                headsign: Some("Depot".into()),
                direction_id: None,
            },
        );
        let mut stop_times = HashMap::new();
        stop_times.insert(
            "MT1".to_string(),
            vec![row_at("M312", 1, 35_000), row_at("M312", 9, 36_000)],
        );
        let mut trips_by_stop = HashMap::new();
        trips_by_stop.insert(
            "M312".to_string(),
            std::collections::HashSet::from(["MT1".to_string()]),
        );
        let schedule = Schedule {
            stops,
            routes: HashMap::new(),
            trips,
            stop_times,
            service_days: HashMap::new(),
            trips_by_stop,
            loaded_at: chrono::Utc::now(),
        };

        // Synthesised table runs two minutes behind at the later stop.
        let mut realistic_rows = HashMap::new();
        realistic_rows.insert(
            "MT1".to_string(),
            vec![row_at("M312", 1, 35_000), row_at("M312", 9, 36_120)],
        );
        let realistic = RealisticTable {
            stop_times: realistic_rows,
            adjusted: 1,
            enforced: 0,
        };

        let docs = metro_arrivals(&schedule, &realistic, "M312", 35_500);
        // The 35 000 s row is in the past and dropped; the future row
        // is schedule-only with the historic latency attached.
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.certainty, "scheduled");
        assert_eq!(doc.scheduled_arrival_time, "10:00:00");
        assert_eq!(doc.expected_arrival_time, "10:00:00");
        assert!(doc.vehicle_position.is_none());
        assert!(doc.delay_seconds.is_none());
        assert_eq!(doc.schedule_relationship, "on time");
        assert_eq!(doc.historic_latency_minutes, Some(2));
        assert_eq!(doc.historic_relationship, "late");
    }

    fn row_at(stop_id: &str, seq: u32, arrival: i32) -> StopTime {
        StopTime {
            stop_sequence: seq,
            stop_id: stop_id.into(),
            arrival_time: arrival,
            departure_time: arrival,
        }
    }

    #[test]
    fn vehicle_cache_trust_and_drop_windows() {
        let base = Instant::now();
        let mut cache = HashMap::new();

        let mut positions = HashMap::new();
        positions.insert("T1".to_string(), vehicle());
        update_vehicle_cache(&mut cache, positions, base);
        assert!(cache.contains_key("T1"));

        // A later refresh without T1 keeps it until the drop window.
        update_vehicle_cache(&mut cache, HashMap::new(), base + Duration::from_secs(200));
        assert!(cache.contains_key("T1"));

        update_vehicle_cache(&mut cache, HashMap::new(), base + Duration::from_secs(301));
        assert!(!cache.contains_key("T1"));
    }
}
