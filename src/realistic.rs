//! Synthesis of realistic stop times from observed arrivals.
//!
//! Reads the arrivals log, condenses the per-(trip, stop) delay samples
//! into a representative delay, and produces a full parallel stop-times
//! table with the delays applied and monotonic time progression
//! enforced along every trip.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::gtfs::static_data::{format_gtfs_time, StopTime};
use crate::gtfs::Schedule;

/// How many IQRs away a sample may sit before it is discarded. 3.0 is
/// deliberately more permissive than the textbook 1.5.
pub const IQR_MULTIPLIER: f64 = 3.0;

/// Groups smaller than this are kept unfiltered.
pub const MIN_SAMPLES_FOR_IQR: usize = 4;

/// Step applied when a delayed stop would not advance past its
/// predecessor.
pub const MONOTONIC_STEP_SECS: i64 = 60;

/// The synthesised timetable: one output row per scheduled row, with
/// arrival and departure collapsed to the same adjusted instant.
pub struct RealisticTable {
    /// trip_id -> rows ordered by stop_sequence.
    pub stop_times: HashMap<String, Vec<StopTime>>,
    pub adjusted: usize,
    pub enforced: usize,
}

/// Run the full pipeline. A missing or empty arrivals log yields a
/// table with all delays at zero (monotonic enforcement still applies).
pub fn synthesise(schedule: &Schedule, log_path: &Path) -> RealisticTable {
    let samples = match read_delay_samples(log_path) {
        Ok(samples) => samples,
        Err(e) => {
            warn!(error = %e, "Could not read arrivals log, synthesising without observations");
            HashMap::new()
        }
    };
    let delays = representative_delays(samples);
    build_table(schedule, &delays)
}

/// Persist the table next to the static feed, in stop_times.txt shape.
/// Both time columns carry the synthesised time.
pub fn write_table(table: &RealisticTable, path: &Path) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["trip_id", "arrival_time", "departure_time", "stop_id", "stop_sequence"])?;

    let mut trip_ids: Vec<&String> = table.stop_times.keys().collect();
    trip_ids.sort();
    for trip_id in trip_ids {
        for row in &table.stop_times[trip_id] {
            let time = format_gtfs_time(row.arrival_time);
            writer.write_record([
                trip_id.as_str(),
                &time,
                &time,
                &row.stop_id,
                &row.stop_sequence.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    info!(path = %path.display(), trips = table.stop_times.len(), "Wrote realistic stop times");
    Ok(())
}

/// Collect raw delay samples per (trip_id, stop_id) from the log.
/// Rows with missing ids, an unparseable delay, or a timestamp that is
/// not "YYYY-MM-DD HH:MM:SS" with an optional zone suffix are skipped.
fn read_delay_samples(
    path: &Path,
) -> Result<HashMap<(String, String), Vec<i64>>, csv::Error> {
    if !path.is_file() {
        warn!(path = %path.display(), "Arrivals log does not exist");
        return Ok(HashMap::new());
    }

    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let idx_trip = headers.iter().position(|h| h == "trip_id");
    let idx_stop = headers.iter().position(|h| h == "stop_id");
    let idx_delay = headers.iter().position(|h| h == "delay_seconds");
    let idx_timestamp = headers.iter().position(|h| h == "timestamp");

    let (Some(idx_trip), Some(idx_stop), Some(idx_delay)) = (idx_trip, idx_stop, idx_delay) else {
        warn!("Arrivals log is missing required columns");
        return Ok(HashMap::new());
    };

    let mut samples: HashMap<(String, String), Vec<i64>> = HashMap::new();
    let mut rows = 0usize;
    let mut skipped_ids = 0usize;
    let mut skipped_delay = 0usize;
    let mut skipped_timestamp = 0usize;

    for result in rdr.records() {
        let Ok(record) = result else {
            skipped_delay += 1;
            continue;
        };
        rows += 1;

        let trip_id = record.get(idx_trip).unwrap_or("").trim();
        let stop_id = record.get(idx_stop).unwrap_or("").trim();
        if trip_id.is_empty() || stop_id.is_empty() {
            skipped_ids += 1;
            continue;
        }

        if let Some(idx) = idx_timestamp {
            let raw = record.get(idx).unwrap_or("");
            if !raw.trim().is_empty() && parse_log_timestamp(raw).is_none() {
                skipped_timestamp += 1;
                continue;
            }
        }

        let delay: Option<i64> = record
            .get(idx_delay)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<f64>().ok())
            .map(|f| f as i64);
        let Some(delay) = delay else {
            skipped_delay += 1;
            continue;
        };

        samples
            .entry((trip_id.to_string(), stop_id.to_string()))
            .or_default()
            .push(delay);
    }

    info!(
        rows,
        groups = samples.len(),
        skipped_ids,
        skipped_delay,
        skipped_timestamp,
        "Parsed arrivals log"
    );
    Ok(samples)
}

/// Accept "2026-07-11 14:03:25" with or without a trailing zone
/// abbreviation such as "EEST".
fn parse_log_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    let without_zone = match trimmed.rsplit_once(' ') {
        Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_alphabetic()) => {
            head
        }
        _ => trimmed,
    };
    NaiveDateTime::parse_from_str(without_zone, "%Y-%m-%d %H:%M:%S").ok()
}

/// Discard samples outside [Q1 - m*IQR, Q3 + m*IQR], where Q1/Q3 are
/// the sorted samples at indexes n/4 and 3n/4. Input order of the
/// survivors is preserved. Groups below the minimum size pass through.
fn iqr_filter(mut delays: Vec<i64>) -> Vec<i64> {
    if delays.len() < MIN_SAMPLES_FOR_IQR {
        return delays;
    }

    let mut sorted = delays.clone();
    sorted.sort_unstable();
    let q1 = sorted[sorted.len() / 4];
    let q3 = sorted[(3 * sorted.len()) / 4];
    let iqr = (q3 - q1) as f64;
    let lower = q1 as f64 - IQR_MULTIPLIER * iqr;
    let upper = q3 as f64 + IQR_MULTIPLIER * iqr;

    delays.retain(|&d| {
        let d = d as f64;
        lower <= d && d <= upper
    });
    delays
}

/// Integer median: the middle sample, or the truncated mean of the two
/// middle samples for even-sized groups.
fn median(values: &[i64]) -> i64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        ((sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0) as i64
    }
}

/// Condense raw samples to one representative delay per (trip, stop).
fn representative_delays(
    raw: HashMap<(String, String), Vec<i64>>,
) -> HashMap<(String, String), i64> {
    let mut before = 0usize;
    let mut after = 0usize;
    let mut delays = HashMap::new();

    for (key, samples) in raw {
        before += samples.len();
        let filtered = iqr_filter(samples);
        after += filtered.len();
        if filtered.is_empty() {
            continue;
        }
        delays.insert(key, median(&filtered));
    }

    if before > 0 {
        info!(
            samples_before = before,
            samples_after = after,
            outliers_removed = before - after,
            pairs = delays.len(),
            "Filtered delay observations"
        );
    }
    delays
}

/// Apply the representative delays to every trip, clamping at zero and
/// enforcing forward time progression stop by stop.
fn build_table(
    schedule: &Schedule,
    delays: &HashMap<(String, String), i64>,
) -> RealisticTable {
    let mut stop_times: HashMap<String, Vec<StopTime>> = HashMap::new();
    let mut adjusted = 0usize;
    let mut enforced = 0usize;

    for (trip_id, rows) in &schedule.stop_times {
        let mut out = Vec::with_capacity(rows.len());
        let mut prev: Option<i64> = None;

        for row in rows {
            let delay = delays
                .get(&(trip_id.clone(), row.stop_id.clone()))
                .copied()
                .unwrap_or(0);
            if delay != 0 {
                adjusted += 1;
            }

            let mut candidate = (row.arrival_time as i64 + delay).max(0);
            if let Some(prev) = prev {
                if candidate <= prev {
                    candidate = prev + MONOTONIC_STEP_SECS;
                    enforced += 1;
                }
            }
            prev = Some(candidate);

            let time = candidate.min(i32::MAX as i64) as i32;
            out.push(StopTime {
                stop_sequence: row.stop_sequence,
                stop_id: row.stop_id.clone(),
                arrival_time: time,
                departure_time: time,
            });
        }
        stop_times.insert(trip_id.clone(), out);
    }

    info!(adjusted, enforced, trips = stop_times.len(), "Synthesised realistic stop times");
    RealisticTable {
        stop_times,
        adjusted,
        enforced,
    }
}
