//! Read-only query layer over the presence store.
//!
//! This module contains:
//! - The timeframe resolution table
//! - Period counts and time series
//! - [`QueryService`], the single entry point used by the HTTP layer
//!
//! Every query runs inside one store critical section. The only mutating
//! call is [`QueryService::clear`].

pub mod series;
pub mod timeframe;

// Re-export commonly used types
pub use series::{PeriodCount, SeriesMode, SeriesPoint, TimeSeries};
pub use timeframe::Timeframe;

use crate::config::Config;
use crate::store::{
    DeviceSummary, SharedStore, Snapshot, SnapshotSummary, StoreStatistics, StoreView,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

/// Devices shown in the dashboard bundle.
pub const DASHBOARD_TOP_DEVICES: usize = 20;
/// Snapshots read for the dashboard activity feed.
pub const DASHBOARD_RECENT_SCAN: usize = 50;
/// Snapshots shown in the dashboard activity feed.
pub const DASHBOARD_RECENT_ACTIVITY: usize = 20;

/// Errors returned by queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No store has been attached yet
    NotReady,
    /// No device with this MAC is tracked
    DeviceNotFound(String),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::NotReady => write!(f, "Storage not initialized"),
            QueryError::DeviceNotFound(mac) => write!(f, "Device not found: {mac}"),
        }
    }
}

impl std::error::Error for QueryError {}

/// A device summary as returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub summary: DeviceSummary,
    /// Display signal: latest reading
    pub rssi: i32,
}

impl From<DeviceSummary> for DeviceView {
    fn from(summary: DeviceSummary) -> Self {
        Self {
            rssi: summary.latest_rssi,
            summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeDevice {
    pub mac: String,
    pub rssi: i32,
    /// UTC time of the snapshot, `%Y-%m-%dT%H:%M:%SZ`
    pub timestamp: String,
    pub is_random: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeView {
    pub unique_devices: usize,
    pub devices: Vec<RealtimeDevice>,
}

/// Everything the dashboard front page needs in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardBundle {
    pub statistics: StoreStatistics,
    pub top_devices: Vec<DeviceView>,
    pub recent_activity: Vec<Snapshot>,
    pub unique_devices_count: usize,
    /// Devices observed more than once
    pub active_devices: usize,
}

/// Query entry point shared by HTTP handlers.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Option<SharedStore>,
    realtime_window: Duration,
    realtime_scan_limit: usize,
}

impl QueryService {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store: Some(store),
            ..Self::unready()
        }
    }

    /// A service with no store attached. Every query reports
    /// [`QueryError::NotReady`].
    pub fn unready() -> Self {
        let defaults = Config::default();
        Self {
            store: None,
            realtime_window: defaults.realtime_window,
            realtime_scan_limit: defaults.realtime_scan_limit,
        }
    }

    pub fn from_config(store: SharedStore, config: &Config) -> Self {
        Self::new(store).with_realtime(config.realtime_window, config.realtime_scan_limit)
    }

    pub fn with_realtime(mut self, window: Duration, scan_limit: usize) -> Self {
        self.realtime_window = window;
        self.realtime_scan_limit = scan_limit;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&SharedStore, QueryError> {
        self.store.as_ref().ok_or(QueryError::NotReady)
    }

    fn read<R>(&self, f: impl FnOnce(StoreView<'_>) -> R) -> Result<R, QueryError> {
        Ok(self.store()?.read(f))
    }

    pub fn statistics(&self) -> Result<StoreStatistics, QueryError> {
        self.read(|view| view.statistics())
    }

    pub fn devices(&self, limit: Option<usize>) -> Result<Vec<DeviceView>, QueryError> {
        self.read(|view| {
            view.devices_by_recency(limit)
                .into_iter()
                .map(|d| DeviceView::from(d.clone()))
                .collect()
        })
    }

    /// Look up one device, case-insensitively.
    pub fn device(&self, mac: &str) -> Result<DeviceView, QueryError> {
        self.read(|view| view.device(mac).cloned())?
            .map(DeviceView::from)
            .ok_or_else(|| QueryError::DeviceNotFound(mac.to_lowercase()))
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<Snapshot>, QueryError> {
        self.read(|view| view.recent_snapshots(limit).cloned().collect())
    }

    pub fn dashboard(&self, limit: usize) -> Result<DashboardBundle, QueryError> {
        self.read(|view| {
            let top_devices = view
                .devices_by_recency(Some(limit))
                .into_iter()
                .take(DASHBOARD_TOP_DEVICES)
                .map(|d| DeviceView::from(d.clone()))
                .collect();

            let recent: Vec<&Snapshot> = view.recent_snapshots(DASHBOARD_RECENT_SCAN).collect();
            let skip = recent.len().saturating_sub(DASHBOARD_RECENT_ACTIVITY);
            let recent_activity = recent.into_iter().skip(skip).cloned().collect();

            DashboardBundle {
                statistics: view.statistics(),
                top_devices,
                recent_activity,
                unique_devices_count: view.device_count(),
                active_devices: view.devices().filter(|d| d.occurrence_count > 1).count(),
            }
        })
    }

    pub fn realtime(&self) -> Result<RealtimeView, QueryError> {
        self.realtime_at(Utc::now().timestamp())
    }

    /// Unique MACs seen within the realtime window ending at `now`.
    pub fn realtime_at(&self, now: i64) -> Result<RealtimeView, QueryError> {
        let cutoff = now - self.realtime_window.as_secs() as i64;
        let scan_limit = self.realtime_scan_limit;

        self.read(|view| {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut devices = Vec::new();

            let window = view
                .recent_snapshots(scan_limit)
                .filter(|s| s.timestamp >= cutoff);
            for snapshot in window {
                let timestamp = format_timestamp(snapshot.timestamp, now);
                for entry in &snapshot.observations {
                    if entry.mac.is_empty() || !seen.insert(entry.mac.as_str()) {
                        continue;
                    }
                    // Classification may have been refined since the snapshot.
                    let summary = view.device(&entry.mac);
                    devices.push(RealtimeDevice {
                        mac: entry.mac.clone(),
                        rssi: display_rssi(Some(entry.rssi), summary),
                        timestamp: timestamp.clone(),
                        is_random: summary.is_some_and(|d| d.randomized),
                    });
                }
            }

            RealtimeView {
                unique_devices: devices.len(),
                devices,
            }
        })
    }

    pub fn summary(&self) -> Result<SnapshotSummary, QueryError> {
        self.read(|view| view.snapshot_summary())
    }

    pub fn period_count(&self, timeframe: Timeframe) -> Result<PeriodCount, QueryError> {
        self.period_count_at(timeframe, Utc::now().timestamp())
    }

    pub fn period_count_at(&self, timeframe: Timeframe, now: i64) -> Result<PeriodCount, QueryError> {
        self.read(|view| series::period_count(view, timeframe, now))
    }

    pub fn timeseries(&self, timeframe: Timeframe, mode: SeriesMode) -> Result<TimeSeries, QueryError> {
        self.timeseries_at(timeframe, mode, Utc::now().timestamp())
    }

    pub fn timeseries_at(
        &self,
        timeframe: Timeframe,
        mode: SeriesMode,
        now: i64,
    ) -> Result<TimeSeries, QueryError> {
        let series = self.read(|view| match mode {
            SeriesMode::Snapshots => series::snapshot_series(view, timeframe, now),
            SeriesMode::Presence => series::presence_series(view, timeframe, now),
        })?;
        info!(
            timeframe = %timeframe,
            mode = %mode,
            bucket_sec = series.bucket_sec,
            points = series.points.len(),
            "Built devices time series"
        );
        Ok(series)
    }

    /// Drop all stored data.
    pub fn clear(&self) -> Result<(), QueryError> {
        self.store()?.clear();
        info!("Cleared all presence data");
        Ok(())
    }
}

/// Signal to display for a realtime entry: the observation's own value,
/// then the device's latest, then its best, then zero.
fn display_rssi(observed: Option<i32>, summary: Option<&DeviceSummary>) -> i32 {
    observed
        .or_else(|| summary.map(|d| d.latest_rssi))
        .or_else(|| summary.map(|d| d.best_rssi))
        .unwrap_or(0)
}

fn format_timestamp(ts: i64, fallback: i64) -> String {
    let time = DateTime::<Utc>::from_timestamp(ts, 0)
        .or_else(|| DateTime::<Utc>::from_timestamp(fallback, 0))
        .unwrap_or_default();
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
