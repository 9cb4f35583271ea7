//! Time-bucketed views over the presence store.
//!
//! All functions here take a [`StoreView`], so callers run them inside the
//! store lock and every number in one response comes from one state.

use crate::query::timeframe::Timeframe;
use crate::store::StoreView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which series a time-series query produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesMode {
    /// One point per snapshot, or daily maxima for long windows
    #[default]
    Snapshots,
    /// Devices active per bucket, forward-filled across gaps
    Presence,
}

impl fmt::Display for SeriesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesMode::Snapshots => f.write_str("snapshots"),
            SeriesMode::Presence => f.write_str("presence"),
        }
    }
}

impl FromStr for SeriesMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "snapshots" | "snapshot" | "raw" => Ok(SeriesMode::Snapshots),
            "presence" => Ok(SeriesMode::Presence),
            other => Err(format!("unknown series mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub t: i64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub timeframe: Timeframe,
    pub start_ts: i64,
    pub end_ts: i64,
    /// Zero when every point is a raw snapshot
    pub bucket_sec: i64,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCount {
    pub timeframe: Timeframe,
    pub count: usize,
    pub start_ts: i64,
    pub end_ts: i64,
}

/// End of every query window: the later of `now` and the newest data.
///
/// A backlog replayed with old timestamps must not make a live window
/// look empty.
pub fn resolve_end_ts(view: StoreView<'_>, now: i64) -> i64 {
    view.latest_timestamp().map_or(now, |latest| latest.max(now))
}

/// Devices whose `last_seen` falls in `[end - duration, end]`.
pub fn period_count(view: StoreView<'_>, timeframe: Timeframe, now: i64) -> PeriodCount {
    let end_ts = resolve_end_ts(view, now);
    let start_ts = end_ts - timeframe.duration_secs();
    let count = view
        .devices()
        .filter(|d| (start_ts..=end_ts).contains(&d.last_seen))
        .count();

    PeriodCount {
        timeframe,
        count,
        start_ts,
        end_ts,
    }
}

/// Distinct MACs per snapshot. Raw points for short windows; per-bucket
/// maximum when the timeframe has a snapshot bucket width.
pub fn snapshot_series(view: StoreView<'_>, timeframe: Timeframe, now: i64) -> TimeSeries {
    let end_ts = resolve_end_ts(view, now);
    let start_ts = end_ts - timeframe.duration_secs();
    let bucket_sec = timeframe.snapshot_bucket_secs();

    let mut in_window: Vec<SeriesPoint> = view
        .snapshots()
        .filter(|s| (start_ts..=end_ts).contains(&s.timestamp))
        .map(|s| SeriesPoint {
            t: s.timestamp,
            count: s.unique_count(),
        })
        .collect();
    // Arrival order is not time order when backlogs are replayed.
    in_window.sort_by_key(|p| p.t);

    let points = if bucket_sec == 0 {
        in_window
    } else {
        let mut buckets: BTreeMap<i64, usize> = BTreeMap::new();
        for point in in_window {
            let bucket = bucket_start(point.t, bucket_sec);
            let max = buckets.entry(bucket).or_insert(0);
            *max = (*max).max(point.count);
        }
        buckets
            .into_iter()
            .map(|(t, count)| SeriesPoint { t, count })
            .collect()
    };

    TimeSeries {
        timeframe,
        start_ts,
        end_ts,
        bucket_sec,
        points,
    }
}

/// Devices active in each fixed-width bucket across the window.
///
/// A device is active in `[b, b + width)` when `first_seen < b + width` and
/// `last_seen >= b`. Empty buckets after a nonzero one repeat the last
/// nonzero count, since the scanner reports less often than the bucket width.
pub fn presence_series(view: StoreView<'_>, timeframe: Timeframe, now: i64) -> TimeSeries {
    let end_ts = resolve_end_ts(view, now);
    let start_ts = end_ts - timeframe.duration_secs();
    let bucket_sec = timeframe.presence_bucket_secs();

    let lifetimes: Vec<(i64, i64)> = view
        .devices()
        .filter(|d| d.last_seen > 0)
        .map(|d| (d.first_seen, d.last_seen))
        .collect();

    let first_bucket = bucket_start(start_ts, bucket_sec);
    let last_bucket = bucket_start(end_ts, bucket_sec);

    let mut points = Vec::new();
    let mut last_known = 0;
    let mut bucket = first_bucket;
    loop {
        // Saturates for data stamped at the end of the i64 range.
        let bucket_end = bucket.saturating_add(bucket_sec);
        let active = lifetimes
            .iter()
            .filter(|(first, last)| *first < bucket_end && *last >= bucket)
            .count();

        let count = if active > 0 {
            last_known = active;
            active
        } else {
            last_known
        };
        points.push(SeriesPoint { t: bucket, count });

        match bucket.checked_add(bucket_sec) {
            Some(next) if next <= last_bucket => bucket = next,
            _ => break,
        }
    }

    TimeSeries {
        timeframe,
        start_ts,
        end_ts,
        bucket_sec,
        points,
    }
}

fn bucket_start(ts: i64, width: i64) -> i64 {
    ts.div_euclid(width) * width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DeviceObservation, PresenceStore};

    // 2023-11-14T00:00:00Z, aligned to days and hours.
    const DAY_START: i64 = 1_699_920_000;

    fn batch(prefix: u8, n: u8, ts: i64) -> Vec<DeviceObservation> {
        (0..n)
            .map(|i| DeviceObservation::new(format!("{prefix:02x}:00:00:00:00:{i:02x}"), -60, ts))
            .collect()
    }

    #[test]
    fn test_end_ts_follows_newest_data() {
        let store = PresenceStore::new(100, 100);
        assert_eq!(store.read(|v| resolve_end_ts(v, 1_000)), 1_000);

        store.add(&batch(1, 1, 5_000));
        assert_eq!(store.read(|v| resolve_end_ts(v, 1_000)), 5_000);
        assert_eq!(store.read(|v| resolve_end_ts(v, 9_000)), 9_000);
    }

    #[test]
    fn test_period_count_is_inclusive() {
        let store = PresenceStore::new(100, 100);
        let end = DAY_START + 7_200;
        store.add(&batch(1, 2, end - 3_600));
        store.add(&batch(2, 3, end - 3_601));
        store.add(&batch(3, 1, end));

        let count = store.read(|v| period_count(v, Timeframe::OneHour, end - 100));
        assert_eq!(count.end_ts, end);
        assert_eq!(count.start_ts, end - 3_600);
        assert_eq!(count.count, 3);

        let count = store.read(|v| period_count(v, Timeframe::SixHours, end));
        assert_eq!(count.count, 6);
    }

    #[test]
    fn test_thirty_day_bucket_reports_max() {
        let store = PresenceStore::new(100, 100);
        store.add(&batch(1, 5, DAY_START + 3_600));
        store.add(&batch(2, 9, DAY_START + 7_200));
        store.add(&batch(3, 4, DAY_START + 86_400 + 60));

        let now = DAY_START + 2 * 86_400;
        let series = store.read(|v| snapshot_series(v, Timeframe::ThirtyDays, now));
        assert_eq!(series.bucket_sec, 86_400);
        assert_eq!(
            series.points,
            vec![
                SeriesPoint { t: DAY_START, count: 9 },
                SeriesPoint { t: DAY_START + 86_400, count: 4 },
            ]
        );
    }

    #[test]
    fn test_raw_series_one_point_per_snapshot() {
        let store = PresenceStore::new(100, 100);
        let now = DAY_START + 10_000;
        store.add(&batch(1, 2, now - 300));
        store.add(&batch(2, 3, now - 600));
        // Outside the one-hour window.
        store.add(&batch(3, 7, now - 4_000));

        let series = store.read(|v| snapshot_series(v, Timeframe::OneHour, now));
        assert_eq!(series.bucket_sec, 0);
        assert_eq!(series.start_ts, now - 3_600);
        assert_eq!(
            series.points,
            vec![
                SeriesPoint { t: now - 600, count: 3 },
                SeriesPoint { t: now - 300, count: 2 },
            ]
        );
    }

    #[test]
    fn test_raw_series_counts_distinct_macs() {
        let store = PresenceStore::new(100, 100);
        let mut observations = batch(1, 2, DAY_START);
        observations.extend(batch(1, 2, DAY_START));

        store.add(&observations);
        let series = store.read(|v| snapshot_series(v, Timeframe::OneHour, DAY_START));
        assert_eq!(series.points, vec![SeriesPoint { t: DAY_START, count: 2 }]);
    }

    #[test]
    fn test_presence_forward_fill() {
        let store = PresenceStore::new(100, 100);
        // Hour-aligned window ending at minute 50.
        let hour = DAY_START + 3_600;
        let now = hour + 3_000;
        store.add(&batch(1, 3, hour));
        store.add(&batch(2, 2, hour + 2_400));

        let series = store.read(|v| presence_series(v, Timeframe::OneHour, now));
        assert_eq!(series.bucket_sec, 600);
        assert_eq!(series.end_ts, now);

        let at = |t: i64| {
            series
                .points
                .iter()
                .find(|p| p.t == t)
                .map(|p| p.count)
                .unwrap()
        };
        // Minute 0 through the last bucket before new data hold 3.
        assert_eq!(at(hour), 3);
        assert_eq!(at(hour + 600), 3);
        assert_eq!(at(hour + 1_200), 3);
        assert_eq!(at(hour + 1_800), 3);
        // New data at minute 40.
        assert_eq!(at(hour + 2_400), 2);
        assert_eq!(at(hour + 3_000), 2);
        // Buckets before any data stay at zero.
        assert_eq!(at(hour - 600), 0);
    }

    #[test]
    fn test_presence_buckets_cover_window() {
        let store = PresenceStore::new(100, 100);
        let now = DAY_START + 3_600;
        let series = store.read(|v| presence_series(v, Timeframe::OneHour, now));

        assert_eq!(series.points.len(), 7);
        assert_eq!(series.points[0].t, DAY_START);
        assert_eq!(series.points[6].t, now);
        assert!(series.points.iter().all(|p| p.count == 0));
    }

    #[test]
    fn test_long_lived_device_counts_in_every_bucket() {
        let store = PresenceStore::new(100, 100);
        let hour = DAY_START + 3_600;
        store.add(&[DeviceObservation::new("aa:00:00:00:00:01", -50, hour)]);
        store.add(&[DeviceObservation::new("aa:00:00:00:00:01", -50, hour + 3_000)]);

        let series = store.read(|v| presence_series(v, Timeframe::OneHour, hour + 3_000));
        for point in series.points.iter().filter(|p| p.t >= hour) {
            assert_eq!(point.count, 1);
        }
    }

    #[test]
    fn test_timestamps_at_end_of_range_stay_bounded() {
        let store = PresenceStore::new(100, 100);
        store.add(&[DeviceObservation::new("00:1e:c2:aa:bb:cc", -60, i64::MAX)]);

        let series = store.read(|v| presence_series(v, Timeframe::OneHour, DAY_START));
        assert_eq!(series.end_ts, i64::MAX);
        assert!(!series.points.is_empty());
        assert!(series.points.len() <= 7);
        assert!(series.points.windows(2).all(|w| w[0].t < w[1].t));

        let series = store.read(|v| snapshot_series(v, Timeframe::ThirtyDays, DAY_START));
        assert_eq!(series.points.len(), 1);

        // The store lock is still usable afterwards.
        store.add(&batch(1, 1, DAY_START));
        assert_eq!(store.get_unique_devices_count(), 2);
    }

    #[test]
    fn test_series_mode_parsing() {
        assert_eq!("presence".parse::<SeriesMode>(), Ok(SeriesMode::Presence));
        assert_eq!("Snapshots".parse::<SeriesMode>(), Ok(SeriesMode::Snapshots));
        assert!("bogus".parse::<SeriesMode>().is_err());
    }
}
