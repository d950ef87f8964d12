//! Static GTFS schedule: typed parsing of the flat feed files and the
//! indexed in-memory store the rest of the system reads from.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, warn};

use super::error::ScheduleError;

/// Route type codes carried by the feed. The mapping is authoritative:
/// 0 tram, 1 metro, 3 bus, 11 trolleybus.
pub const ROUTE_TYPE_TRAM: i32 = 0;
pub const ROUTE_TYPE_METRO: i32 = 1;
pub const ROUTE_TYPE_BUS: i32 = 3;
pub const ROUTE_TYPE_TROLLEYBUS: i32 = 11;

/// A stop (from stops.txt). Rows without an id, a name or parseable
/// in-range coordinates are rejected at ingest.
#[derive(Debug, Clone)]
pub struct Stop {
    pub stop_id: String,
    pub stop_name: String,
    pub lat: f64,
    pub lon: f64,
}

/// A route (from routes.txt).
#[derive(Debug, Clone)]
pub struct Route {
    pub route_id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub route_type: i32,
}

impl Route {
    /// The rider-facing id: a vehicle-type prefix plus the short name,
    /// e.g. bus "84" becomes "A84". None when the feed carries no short
    /// name for the route.
    pub fn external_id(&self) -> Option<String> {
        let short_name = self.short_name.as_deref()?;
        let prefix = match self.route_type {
            ROUTE_TYPE_TRAM => "TM",
            ROUTE_TYPE_METRO => "M",
            ROUTE_TYPE_BUS => "A",
            ROUTE_TYPE_TROLLEYBUS => "TB",
            _ => "",
        };
        Some(format!("{prefix}{short_name}"))
    }
}

/// A trip (from trips.txt): one ordered realisation of a route on a
/// service day.
#[derive(Debug, Clone)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub headsign: Option<String>,
    pub direction_id: Option<i32>,
}

/// One row of stop_times.txt, keyed under its trip. Times are schedule
/// seconds from midnight of the service day; values >= 86400 describe
/// after-midnight operation of that day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTime {
    pub stop_sequence: u32,
    pub stop_id: String,
    pub arrival_time: i32,
    pub departure_time: i32,
}

/// The full static schedule, immutable after `load`.
#[derive(Debug)]
pub struct Schedule {
    pub stops: HashMap<String, Stop>,
    pub routes: HashMap<String, Route>,
    pub trips: HashMap<String, Trip>,
    /// trip_id -> stop-time rows ordered by stop_sequence.
    pub stop_times: HashMap<String, Vec<StopTime>>,
    /// service_id -> dates the service operates on. Only "added"
    /// calendar exceptions (exception_type 1) are retained; removals
    /// are honoured by absence.
    pub service_days: HashMap<String, HashSet<NaiveDate>>,
    /// stop_id -> trips calling at that stop.
    pub trips_by_stop: HashMap<String, HashSet<String>>,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

impl Schedule {
    /// Whether a service operates on the given calendar date.
    pub fn operates_on(&self, service_id: &str, date: NaiveDate) -> bool {
        self.service_days
            .get(service_id)
            .is_some_and(|dates| dates.contains(&date))
    }

    /// Load the schedule from a directory of GTFS text files. Missing
    /// mandatory files are fatal; malformed rows are skipped with a
    /// warning.
    pub fn load(dir: &Path) -> Result<Schedule, ScheduleError> {
        let stops = parse_stops(&open(dir, "stops.txt")?)?;
        info!(count = stops.len(), "Parsed GTFS stops");

        let routes = parse_routes(&open(dir, "routes.txt")?)?;
        info!(count = routes.len(), "Parsed GTFS routes");

        let trips = parse_trips(&open(dir, "trips.txt")?, &routes)?;
        info!(count = trips.len(), "Parsed GTFS trips");

        let stop_times = parse_stop_times(&open(dir, "stop_times.txt")?, &stops)?;
        let total: usize = stop_times.values().map(|v| v.len()).sum();
        info!(
            trips_with_times = stop_times.len(),
            total_stop_times = total,
            "Parsed GTFS stop_times"
        );

        let service_days = parse_calendar_dates(&open(dir, "calendar_dates.txt")?)?;
        let total_dates: usize = service_days.values().map(|v| v.len()).sum();
        info!(
            services = service_days.len(),
            total_dates, "Parsed GTFS calendar_dates"
        );

        let mut trips_by_stop: HashMap<String, HashSet<String>> = HashMap::new();
        for (trip_id, rows) in &stop_times {
            for row in rows {
                trips_by_stop
                    .entry(row.stop_id.clone())
                    .or_default()
                    .insert(trip_id.clone());
            }
        }
        info!(stops_indexed = trips_by_stop.len(), "Built trips-by-stop index");

        Ok(Schedule {
            stops,
            routes,
            trips,
            stop_times,
            service_days,
            trips_by_stop,
            loaded_at: chrono::Utc::now(),
        })
    }
}

fn open(dir: &Path, name: &str) -> Result<std::path::PathBuf, ScheduleError> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(ScheduleError::MissingFile(name.to_string()));
    }
    Ok(path)
}

// --- Time helpers ---

/// Parse a GTFS time string "HH:MM:SS" to seconds since midnight.
/// Supports hours >= 24 for trips crossing midnight.
pub fn parse_gtfs_time(time_str: &str) -> Option<i32> {
    let mut parts = time_str.split(':');
    let hours: i32 = parts.next()?.trim().parse().ok()?;
    let minutes: i32 = parts.next()?.trim().parse().ok()?;
    let seconds: i32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    if hours < 0 || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Format seconds since midnight back to "HH:MM:SS", keeping the GTFS
/// convention of hours >= 24 for after-midnight times.
pub fn format_gtfs_time(seconds: i32) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Parse a GTFS date string "YYYYMMDD".
pub fn parse_gtfs_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// --- CSV parsing ---

fn header_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim_start_matches('\u{feff}') == name)
}

fn required_index(
    headers: &csv::StringRecord,
    file: &str,
    name: &str,
) -> Result<usize, ScheduleError> {
    header_index(headers, name)
        .ok_or_else(|| ScheduleError::Parse(format!("{file} missing {name}")))
}

fn parse_stops(path: &Path) -> Result<HashMap<String, Stop>, ScheduleError> {
    info!("Parsing stops.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_id = required_index(&headers, "stops.txt", "stop_id")?;
    let idx_name = required_index(&headers, "stops.txt", "stop_name")?;
    let idx_lat = required_index(&headers, "stops.txt", "stop_lat")?;
    let idx_lon = required_index(&headers, "stops.txt", "stop_lon")?;

    let mut stops = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let stop_id = record.get(idx_id).unwrap_or("").to_string();
        let stop_name = record.get(idx_name).unwrap_or("").to_string();
        let lat: Option<f64> = record.get(idx_lat).and_then(|s| s.trim().parse().ok());
        let lon: Option<f64> = record.get(idx_lon).and_then(|s| s.trim().parse().ok());

        let (Some(lat), Some(lon)) = (lat, lon) else {
            skipped += 1;
            continue;
        };
        if stop_id.is_empty()
            || stop_name.is_empty()
            || !lat.is_finite()
            || !lon.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lon)
        {
            skipped += 1;
            continue;
        }

        stops.insert(
            stop_id.clone(),
            Stop {
                stop_id,
                stop_name,
                lat,
                lon,
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stops.txt records with missing fields or bad coordinates");
    }
    Ok(stops)
}

fn parse_routes(path: &Path) -> Result<HashMap<String, Route>, ScheduleError> {
    info!("Parsing routes.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_id = required_index(&headers, "routes.txt", "route_id")?;
    let idx_type = required_index(&headers, "routes.txt", "route_type")?;
    let idx_short = header_index(&headers, "route_short_name");
    let idx_long = header_index(&headers, "route_long_name");

    let mut routes = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let route_id = record.get(idx_id).unwrap_or("").to_string();
        let route_type: Option<i32> = record.get(idx_type).and_then(|s| s.trim().parse().ok());
        let Some(route_type) = route_type else {
            skipped += 1;
            continue;
        };
        if route_id.is_empty() {
            skipped += 1;
            continue;
        }
        routes.insert(
            route_id.clone(),
            Route {
                route_id,
                short_name: idx_short.and_then(|i| record.get(i)).and_then(non_empty),
                long_name: idx_long.and_then(|i| record.get(i)).and_then(non_empty),
                route_type,
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped routes.txt records with missing fields");
    }
    Ok(routes)
}

fn parse_trips(
    path: &Path,
    routes: &HashMap<String, Route>,
) -> Result<HashMap<String, Trip>, ScheduleError> {
    info!("Parsing trips.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_trip = required_index(&headers, "trips.txt", "trip_id")?;
    let idx_route = required_index(&headers, "trips.txt", "route_id")?;
    let idx_service = required_index(&headers, "trips.txt", "service_id")?;
    let idx_headsign = header_index(&headers, "trip_headsign");
    let idx_dir = header_index(&headers, "direction_id");

    let mut trips = HashMap::new();
    let mut skipped = 0usize;
    let mut unknown_route = 0usize;
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        let route_id = record.get(idx_route).unwrap_or("").to_string();
        let service_id = record.get(idx_service).unwrap_or("").to_string();
        if trip_id.is_empty() || route_id.is_empty() || service_id.is_empty() {
            skipped += 1;
            continue;
        }
        if !routes.contains_key(&route_id) {
            unknown_route += 1;
            continue;
        }
        trips.insert(
            trip_id.clone(),
            Trip {
                trip_id,
                route_id,
                service_id,
                headsign: idx_headsign.and_then(|i| record.get(i)).and_then(non_empty),
                direction_id: idx_dir
                    .and_then(|i| record.get(i))
                    .and_then(|s| s.trim().parse().ok()),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped trips.txt records with missing fields");
    }
    if unknown_route > 0 {
        warn!(unknown_route, "Skipped trips.txt records referencing unknown routes");
    }
    Ok(trips)
}

fn parse_stop_times(
    path: &Path,
    stops: &HashMap<String, Stop>,
) -> Result<HashMap<String, Vec<StopTime>>, ScheduleError> {
    info!("Parsing stop_times.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_trip = required_index(&headers, "stop_times.txt", "trip_id")?;
    let idx_seq = required_index(&headers, "stop_times.txt", "stop_sequence")?;
    let idx_stop = required_index(&headers, "stop_times.txt", "stop_id")?;
    let idx_arr = required_index(&headers, "stop_times.txt", "arrival_time")?;
    let idx_dep = required_index(&headers, "stop_times.txt", "departure_time")?;

    let mut stop_times: HashMap<String, Vec<StopTime>> = HashMap::new();
    let mut skipped = 0usize;
    let mut unknown_stop = 0usize;
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        let stop_id = record.get(idx_stop).unwrap_or("").to_string();
        let stop_sequence: Option<u32> = record.get(idx_seq).and_then(|s| s.trim().parse().ok());
        let arrival = record.get(idx_arr).and_then(parse_gtfs_time);
        let departure = record.get(idx_dep).and_then(parse_gtfs_time);

        let (Some(stop_sequence), Some(arrival_time), Some(departure_time)) =
            (stop_sequence, arrival, departure)
        else {
            skipped += 1;
            continue;
        };
        if trip_id.is_empty() || stop_id.is_empty() {
            skipped += 1;
            continue;
        }
        if !stops.contains_key(&stop_id) {
            unknown_stop += 1;
            continue;
        }

        stop_times.entry(trip_id).or_default().push(StopTime {
            stop_sequence,
            stop_id,
            arrival_time,
            departure_time,
        });
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stop_times.txt records with missing or malformed fields");
    }
    if unknown_stop > 0 {
        warn!(unknown_stop, "Skipped stop_times.txt records referencing unknown stops");
    }

    for rows in stop_times.values_mut() {
        rows.sort_by_key(|row| row.stop_sequence);
        rows.dedup_by_key(|row| row.stop_sequence);
    }

    Ok(stop_times)
}

fn parse_calendar_dates(
    path: &Path,
) -> Result<HashMap<String, HashSet<NaiveDate>>, ScheduleError> {
    info!("Parsing calendar_dates.txt");
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_service = required_index(&headers, "calendar_dates.txt", "service_id")?;
    let idx_date = required_index(&headers, "calendar_dates.txt", "date")?;
    let idx_type = required_index(&headers, "calendar_dates.txt", "exception_type")?;

    let mut service_days: HashMap<String, HashSet<NaiveDate>> = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let service_id = record.get(idx_service).unwrap_or("").to_string();
        let date = record.get(idx_date).and_then(parse_gtfs_date);
        let exception_type = record.get(idx_type).map(str::trim);

        let Some(date) = date else {
            skipped += 1;
            continue;
        };
        if service_id.is_empty() {
            skipped += 1;
            continue;
        }
        // Only "added" exceptions define operating days; removals are
        // honoured by never being inserted.
        if exception_type != Some("1") {
            continue;
        }
        service_days.entry(service_id).or_default().insert(date);
    }
    if skipped > 0 {
        warn!(skipped, "Skipped calendar_dates.txt records with missing fields");
    }
    Ok(service_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gtfs_time() {
        assert_eq!(parse_gtfs_time("08:30:00"), Some(30600));
        assert_eq!(parse_gtfs_time("00:00:00"), Some(0));
        assert_eq!(parse_gtfs_time("24:00:00"), Some(86400));
        assert_eq!(parse_gtfs_time("25:30:00"), Some(91800));
        assert_eq!(parse_gtfs_time("8:30:00"), Some(30600)); // single digit hours still parse
        assert_eq!(parse_gtfs_time("invalid"), None);
        assert_eq!(parse_gtfs_time(""), None);
        assert_eq!(parse_gtfs_time("08:30"), None); // missing seconds
        assert_eq!(parse_gtfs_time("08:30:00:00"), None); // too many parts
        assert_eq!(parse_gtfs_time("08:61:00"), None);
    }

    #[test]
    fn test_format_gtfs_time_keeps_after_midnight_hours() {
        assert_eq!(format_gtfs_time(0), "00:00:00");
        assert_eq!(format_gtfs_time(30600), "08:30:00");
        assert_eq!(format_gtfs_time(91800), "25:30:00");
        assert_eq!(format_gtfs_time(-5), "00:00:00");
    }

    #[test]
    fn test_parse_gtfs_date() {
        assert_eq!(
            parse_gtfs_date("20260201"),
            Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())
        );
        assert_eq!(parse_gtfs_date("20260229"), None); // 2026 is not a leap year
        assert_eq!(parse_gtfs_date("invalid"), None);
        assert_eq!(parse_gtfs_date(""), None);
    }

    #[test]
    fn external_id_uses_type_prefix() {
        let route = Route {
            route_id: "84".into(),
            short_name: Some("84".into()),
            long_name: None,
            route_type: ROUTE_TYPE_BUS,
        };
        assert_eq!(route.external_id(), Some("A84".into()));

        let tram = Route {
            route_id: "tm5".into(),
            short_name: Some("5".into()),
            long_name: None,
            route_type: ROUTE_TYPE_TRAM,
        };
        assert_eq!(tram.external_id(), Some("TM5".into()));

        let trolley = Route {
            route_id: "tb9".into(),
            short_name: Some("9".into()),
            long_name: None,
            route_type: ROUTE_TYPE_TROLLEYBUS,
        };
        assert_eq!(trolley.external_id(), Some("TB9".into()));

        let nameless = Route {
            route_id: "x".into(),
            short_name: None,
            long_name: None,
            route_type: ROUTE_TYPE_METRO,
        };
        assert_eq!(nameless.external_id(), None);
    }

    fn write_feed(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("stops.txt"),
            "stop_id,stop_name,stop_lat,stop_lon\n\
             A,Alpha,42.70,23.30\n\
             B,Beta,42.71,23.31\n\
             ,Nameless,42.72,23.32\n\
             C,NoCoords,,\n\
             D,BadLat,123.0,23.0\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("routes.txt"),
            "route_id,route_short_name,route_long_name,route_type\n\
             R1,84,Alpha - Beta,3\n\
             R2,,Ring,0\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("trips.txt"),
            "route_id,service_id,trip_id,trip_headsign,direction_id\n\
             R1,S1,T1,Beta,0\n\
             R1,S1,T2,Alpha,1\n\
             GHOST,S1,T3,Nowhere,0\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("stop_times.txt"),
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,08:00:00,A,1\n\
             T1,08:10:00,08:10:00,B,2\n\
             T1,08:20:00,08:20:00,UNKNOWN,3\n\
             T2,25:30:00,25:30:00,B,1\n\
             T2,bad,08:00:00,A,2\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("calendar_dates.txt"),
            "service_id,date,exception_type\n\
             S1,20260711,1\n\
             S1,20260712,2\n\
             S2,20260711,1\n",
        )
        .unwrap();
    }

    #[test]
    fn load_builds_indexes_and_skips_bad_rows() {
        let dir = std::env::temp_dir().join(format!("gtfs-load-test-{}", std::process::id()));
        write_feed(&dir);

        let schedule = Schedule::load(&dir).unwrap();

        // Stops with missing id, coordinates, or out-of-range latitude
        // are dropped.
        assert_eq!(schedule.stops.len(), 2);
        assert!(schedule.stops.contains_key("A"));
        assert!(schedule.stops.contains_key("B"));

        assert_eq!(schedule.routes.len(), 2);
        assert_eq!(schedule.routes["R1"].external_id(), Some("A84".into()));

        // Trip referencing an unknown route is dropped.
        assert_eq!(schedule.trips.len(), 2);

        // Row with unknown stop and row with malformed time are dropped;
        // the rest survive ordered by sequence.
        assert_eq!(schedule.stop_times["T1"].len(), 2);
        assert_eq!(schedule.stop_times["T1"][0].stop_id, "A");
        assert_eq!(schedule.stop_times["T2"].len(), 1);
        assert_eq!(schedule.stop_times["T2"][0].arrival_time, 91800);

        // Only exception_type 1 rows define operating days.
        let day = NaiveDate::from_ymd_opt(2026, 7, 11).unwrap();
        let removed = NaiveDate::from_ymd_opt(2026, 7, 12).unwrap();
        assert!(schedule.operates_on("S1", day));
        assert!(!schedule.operates_on("S1", removed));
        assert!(!schedule.operates_on("MISSING", day));

        assert!(schedule.trips_by_stop["A"].contains("T1"));
        assert!(schedule.trips_by_stop["B"].contains("T2"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_fails_on_missing_mandatory_file() {
        let dir = std::env::temp_dir().join(format!("gtfs-missing-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stops.txt"), "stop_id,stop_name,stop_lat,stop_lon\n").unwrap();

        let err = Schedule::load(&dir).unwrap_err();
        assert!(matches!(err, ScheduleError::MissingFile(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn stop_sequences_are_sorted_and_unique() {
        let dir = std::env::temp_dir().join(format!("gtfs-seq-test-{}", std::process::id()));
        write_feed(&dir);
        std::fs::write(
            dir.join("stop_times.txt"),
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:10:00,08:10:00,B,2\n\
             T1,08:00:00,08:00:00,A,1\n\
             T1,08:00:30,08:00:30,B,1\n",
        )
        .unwrap();

        let schedule = Schedule::load(&dir).unwrap();
        let rows = &schedule.stop_times["T1"];
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stop_sequence, 1);
        assert_eq!(rows[1].stop_sequence, 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
