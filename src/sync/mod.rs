//! Background observation of vehicle arrivals.
//!
//! Polls the GTFS-RT vehicle positions feed, detects the moment a
//! vehicle passes a stop on its trip, appends each first detection to
//! the CSV arrivals log, and keeps an in-memory "latest arrival per
//! trip" cache with a short TTL for the API layer.

mod types;

pub use types::LatestArrival;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::geo::haversine_distance_m;
use crate::gtfs::realtime::{fetch_tracked_vehicles, TrackedVehicle, REQUEST_TIMEOUT};
use crate::gtfs::static_data::{Stop, StopTime};
use crate::gtfs::Schedule;

/// How often the position feed is polled.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A vehicle closer than this to a stop counts as arrived.
pub const DISTANCE_THRESHOLD_M: f64 = 30.0;

/// How long a cached latest-arrival entry stays valid after the
/// vehicle was last seen in the feed.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Columns of the arrivals log.
const LOG_HEADER: [&str; 11] = [
    "timestamp",
    "vehicle_id",
    "trip_id",
    "route_id",
    "stop_id",
    "stop_name",
    "scheduled_arrival",
    "actual_arrival",
    "delay_seconds",
    "day_of_week",
    "hour",
];

struct CacheEntry {
    arrival: LatestArrival,
    last_seen: Instant,
}

#[derive(Default)]
struct ObserverState {
    /// Per trip, the stops already logged since process start. Grows
    /// monotonically for the process lifetime.
    observed: HashMap<String, HashSet<String>>,
    latest: HashMap<String, CacheEntry>,
}

pub struct ArrivalObserver {
    schedule: Arc<Schedule>,
    client: reqwest::Client,
    feed_url: String,
    log_path: PathBuf,
    tz: Tz,
    state: Mutex<ObserverState>,
}

impl ArrivalObserver {
    pub fn new(
        schedule: Arc<Schedule>,
        feed_url: String,
        log_path: PathBuf,
        tz: Tz,
    ) -> std::io::Result<Self> {
        init_log(&log_path)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        info!(
            stops = schedule.stops.len(),
            trips = schedule.stop_times.len(),
            cache_ttl = ?CACHE_TTL,
            "Arrival observer ready"
        );
        Ok(Self {
            schedule,
            client,
            feed_url,
            log_path,
            tz,
            state: Mutex::new(ObserverState::default()),
        })
    }

    /// Latest observed arrival for a trip. Entries past the TTL are
    /// treated as absent and evicted on read.
    pub fn latest_arrival(&self, trip_id: &str) -> Option<LatestArrival> {
        let mut state = self.state.lock().unwrap();
        let expired = match state.latest.get(trip_id) {
            Some(entry) => entry_expired(entry.last_seen, Instant::now()),
            None => return None,
        };
        if expired {
            debug!(trip_id, "Latest-arrival cache entry expired");
            state.latest.remove(trip_id);
            return None;
        }
        state.latest.get(trip_id).map(|e| e.arrival.clone())
    }

    /// The polling loop. Runs until the task is cancelled at shutdown;
    /// individual tick failures are logged and skipped.
    pub async fn run(self: Arc<Self>) {
        info!(url = %self.feed_url, interval = ?POLL_INTERVAL, "Starting vehicle position polling");
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        let vehicles = match fetch_tracked_vehicles(&self.client, &self.feed_url).await {
            Ok(vehicles) => vehicles,
            Err(e) => {
                warn!(error = %e, "Vehicle positions fetch failed, skipping tick");
                return;
            }
        };

        let now = chrono::Utc::now().with_timezone(&self.tz);
        let mut logged = 0usize;

        for (trip_id, vehicle) in &vehicles {
            let Some(stop_times) = self.schedule.stop_times.get(trip_id) else {
                continue;
            };

            for st in stop_times {
                let Some(stop) = self.schedule.stops.get(&st.stop_id) else {
                    continue;
                };
                let distance = haversine_distance_m(vehicle.lat, vehicle.lon, stop.lat, stop.lon);
                if !proximity_hit(distance) {
                    continue;
                }
                if self.already_observed(trip_id, &st.stop_id) {
                    continue;
                }

                let scheduled = resolve_scheduled_instant(st.arrival_time, now);
                let delay_seconds = scheduled.map(|s| (now - s).num_seconds());
                let route_id = vehicle
                    .route_id
                    .clone()
                    .or_else(|| self.schedule.trips.get(trip_id).map(|t| t.route_id.clone()));

                if let Err(e) =
                    self.append_log_row(now, vehicle, route_id.as_deref(), st, stop, scheduled, delay_seconds)
                {
                    warn!(error = %e, trip_id = %trip_id, stop_id = %st.stop_id, "Failed to append arrival log row");
                }
                self.record_arrival(trip_id, route_id, st, stop, now, delay_seconds);
                logged += 1;
            }
        }

        // Vehicles still present in the feed keep their cache entries
        // alive even without a new proximity trigger.
        {
            let mut state = self.state.lock().unwrap();
            let now_instant = Instant::now();
            for trip_id in vehicles.keys() {
                if let Some(entry) = state.latest.get_mut(trip_id) {
                    entry.last_seen = now_instant;
                }
            }
        }

        debug!(logged, entities = vehicles.len(), "Processed vehicle positions tick");
    }

    fn already_observed(&self, trip_id: &str, stop_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .observed
            .get(trip_id)
            .is_some_and(|stops| stops.contains(stop_id))
    }

    fn record_arrival(
        &self,
        trip_id: &str,
        route_id: Option<String>,
        st: &StopTime,
        stop: &Stop,
        now: DateTime<Tz>,
        delay_seconds: Option<i64>,
    ) {
        let mut state = self.state.lock().unwrap();
        state
            .observed
            .entry(trip_id.to_string())
            .or_default()
            .insert(st.stop_id.clone());
        state.latest.insert(
            trip_id.to_string(),
            CacheEntry {
                arrival: LatestArrival {
                    trip_id: trip_id.to_string(),
                    route_id,
                    stop_id: st.stop_id.clone(),
                    stop_name: stop.stop_name.clone(),
                    stop_sequence: st.stop_sequence,
                    timestamp: format_log_timestamp(now),
                    delay_seconds,
                },
                last_seen: Instant::now(),
            },
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn append_log_row(
        &self,
        now: DateTime<Tz>,
        vehicle: &TrackedVehicle,
        route_id: Option<&str>,
        st: &StopTime,
        stop: &Stop,
        scheduled: Option<DateTime<Tz>>,
        delay_seconds: Option<i64>,
    ) -> Result<(), csv::Error> {
        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.log_path)
            .map_err(csv::Error::from)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let actual = format_log_timestamp(now);
        writer.write_record([
            actual.as_str(),
            // The trip id doubles as the vehicle id.
            &vehicle.trip_id,
            &vehicle.trip_id,
            route_id.unwrap_or(""),
            &st.stop_id,
            &stop.stop_name,
            &scheduled.map(format_log_timestamp).unwrap_or_default(),
            &actual,
            &delay_seconds.map(|d| d.to_string()).unwrap_or_default(),
            &now.format("%A").to_string(),
            &now.hour().to_string(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

/// "YYYY-MM-DD HH:MM:SS TZ", e.g. "2026-07-11 14:03:25 EEST".
fn format_log_timestamp(dt: DateTime<Tz>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

fn init_log(path: &std::path::Path) -> std::io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(LOG_HEADER)?;
    writer.flush()?;
    Ok(())
}

/// Strictly-below comparison: a vehicle exactly on the threshold does
/// not count as arrived.
fn proximity_hit(distance_m: f64) -> bool {
    distance_m < DISTANCE_THRESHOLD_M
}

fn entry_expired(last_seen: Instant, now: Instant) -> bool {
    now.duration_since(last_seen) >= CACHE_TTL
}

/// Anchor a schedule time (seconds from service-day midnight, possibly
/// >= 86400) to a calendar instant near `now`.
///
/// The base candidate is today's local midnight plus the schedule
/// offset; of {candidate - 1d, candidate, candidate + 1d} the one
/// closest to `now` wins. This resolves both a pre-midnight vehicle
/// running late past midnight and a post-midnight schedule time
/// observed before midnight.
fn resolve_scheduled_instant(schedule_seconds: i32, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let extra_days = (schedule_seconds / 86_400) as i64;
    let within_day = (schedule_seconds % 86_400) as i64;

    let midnight = now
        .timezone()
        .from_local_datetime(&now.date_naive().and_hms_opt(0, 0, 0)?)
        .earliest()?;
    let base = midnight
        + chrono::Duration::days(extra_days)
        + chrono::Duration::seconds(within_day);

    [
        base - chrono::Duration::days(1),
        base,
        base + chrono::Duration::days(1),
    ]
    .into_iter()
    .min_by_key(|candidate| (*candidate - now).num_seconds().abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Sofia;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Tz> {
        Sofia.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn proximity_threshold_is_strict() {
        assert!(proximity_hit(29.9));
        assert!(!proximity_hit(30.0));
        assert!(!proximity_hit(31.0));
    }

    #[test]
    fn cache_entry_expires_at_exactly_ttl() {
        let base = Instant::now();
        assert!(!entry_expired(base, base + Duration::from_millis(59_900)));
        assert!(entry_expired(base, base + Duration::from_millis(60_000)));
        assert!(entry_expired(base, base + Duration::from_secs(120)));
    }

    #[test]
    fn late_vehicle_past_midnight_resolves_to_yesterday_evening() {
        // Scheduled 23:55, observed 00:10 the next day: the scheduled
        // instant is yesterday evening and the vehicle is 15 min late.
        let now = local(2026, 7, 12, 0, 10, 0);
        let scheduled = resolve_scheduled_instant(23 * 3600 + 55 * 60, now).unwrap();
        assert_eq!(scheduled, local(2026, 7, 11, 23, 55, 0));
        assert_eq!((now - scheduled).num_seconds(), 900);
    }

    #[test]
    fn after_midnight_schedule_time_resolves_to_tonight() {
        // Scheduled "25:30:00" (01:30 after the service-day midnight),
        // observed at 01:35: five minutes late.
        let now = local(2026, 7, 12, 1, 35, 0);
        let scheduled = resolve_scheduled_instant(25 * 3600 + 30 * 60, now).unwrap();
        assert_eq!(scheduled, local(2026, 7, 12, 1, 30, 0));
        assert_eq!((now - scheduled).num_seconds(), 300);
    }

    #[test]
    fn early_vehicle_gets_negative_delay() {
        let now = local(2026, 7, 12, 12, 0, 0);
        let scheduled = resolve_scheduled_instant(12 * 3600 + 60, now).unwrap();
        assert_eq!((now - scheduled).num_seconds(), -60);
    }

    #[test]
    fn log_timestamp_carries_zone_abbreviation() {
        let ts = format_log_timestamp(local(2026, 7, 11, 14, 3, 25));
        assert!(ts.starts_with("2026-07-11 14:03:25"));
        assert!(ts.ends_with("EEST"));
    }

    #[test]
    fn log_file_gets_header_once() {
        let path = std::env::temp_dir().join(format!("arrival-log-test-{}.csv", std::process::id()));
        std::fs::remove_file(&path).ok();

        init_log(&path).unwrap();
        init_log(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with("timestamp,vehicle_id,trip_id"));

        std::fs::remove_file(&path).ok();
    }
}
