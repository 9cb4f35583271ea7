//! Bounded, thread-safe presence store.
//!
//! The device map, the snapshot ring and the aggregate counters live behind
//! one mutex. Every public operation, mutations and derived reads alike,
//! runs inside a single critical section, so readers see either the state
//! before an `add` or the state after it, never a half-evicted map.

use crate::classifier::normalize_mac;
use crate::config::StoreConfig;
use crate::store::counters::AggregateCounters;
use crate::store::types::{
    DeviceObservation, DeviceSummary, Snapshot, SnapshotEntry, SnapshotSummary, StoreStatistics,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Thread-safe shared presence store.
pub type SharedStore = Arc<PresenceStore>;

#[derive(Debug, Default)]
struct StoreInner {
    devices: HashMap<String, DeviceSummary>,
    snapshots: VecDeque<Snapshot>,
    counters: AggregateCounters,
}

/// In-memory aggregate of device summaries and per-arrival snapshots.
#[derive(Debug)]
pub struct PresenceStore {
    max_devices: usize,
    max_snapshots: usize,
    inner: Mutex<StoreInner>,
}

impl PresenceStore {
    /// Create a store holding at most `max_devices` summaries and
    /// `max_snapshots` snapshots. Both limits are at least 1.
    pub fn new(max_devices: usize, max_snapshots: usize) -> Self {
        Self {
            max_devices: max_devices.max(1),
            max_snapshots: max_snapshots.max(1),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.max_devices, config.max_snapshots)
    }

    /// Wrap in an `Arc` for sharing between the ingest and query paths.
    pub fn shared(self) -> SharedStore {
        Arc::new(self)
    }

    pub fn max_devices(&self) -> usize {
        self.max_devices
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    // Every critical section leaves the store consistent, so a panic in
    // another holder does not invalidate the data.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one arrival. Always counts as a message, even when empty.
    pub fn add(&self, observations: &[DeviceObservation]) {
        self.add_at(observations, Utc::now());
    }

    /// Like [`add`](Self::add) with an explicit wall clock. Observations
    /// with a non-positive timestamp are stamped with `now`.
    pub fn add_at(&self, observations: &[DeviceObservation], now: DateTime<Utc>) {
        let now_ts = now.timestamp();
        let mut guard = self.lock();
        let inner = &mut *guard;

        inner.counters.record_message(now);

        // Timestamp groups in order of first appearance.
        let mut groups: Vec<(i64, Vec<SnapshotEntry>)> = Vec::new();
        let mut group_index: HashMap<i64, usize> = HashMap::new();
        let mut batch_macs: HashSet<String> = HashSet::new();

        for obs in observations {
            let mac = obs.mac.trim().to_lowercase();
            if mac.is_empty() {
                continue;
            }
            let ts = if obs.timestamp > 0 { obs.timestamp } else { now_ts };

            match inner.devices.get_mut(&mac) {
                Some(summary) => summary.absorb(obs, ts),
                None => {
                    if inner.devices.len() >= self.max_devices {
                        evict_oldest(&mut inner.devices);
                    }
                    inner
                        .devices
                        .insert(mac.clone(), DeviceSummary::first_observation(mac.clone(), obs, ts));
                    inner.counters.record_new_device();
                }
            }

            let idx = *group_index.entry(ts).or_insert_with(|| {
                groups.push((ts, Vec::new()));
                groups.len() - 1
            });
            groups[idx].1.push(SnapshotEntry {
                mac: mac.clone(),
                rssi: obs.rssi,
            });
            batch_macs.insert(mac);
        }

        for (ts, entries) in groups {
            inner.snapshots.push_back(Snapshot::new(ts, entries));
            while inner.snapshots.len() > self.max_snapshots {
                inner.snapshots.pop_front();
            }
        }

        inner.counters.record_batch(batch_macs.len());
    }

    /// Run `f` against a read-only view inside the store's critical section.
    ///
    /// Derived reads (query layer aggregations) use this so they observe one
    /// consistent state without cloning the whole store.
    pub fn read<R>(&self, f: impl FnOnce(StoreView<'_>) -> R) -> R {
        let guard = self.lock();
        f(StoreView { inner: &*guard })
    }

    /// Devices sorted by `last_seen` descending, truncated to `limit`.
    pub fn get_devices(&self, limit: Option<usize>) -> Vec<DeviceSummary> {
        self.read(|view| view.devices_by_recency(limit).into_iter().cloned().collect())
    }

    /// Device by MAC, matched case-insensitively and across notations.
    pub fn get_device(&self, mac: &str) -> Option<DeviceSummary> {
        self.read(|view| view.device(mac).cloned())
    }

    /// The last `limit` snapshots, oldest first.
    pub fn get_recent(&self, limit: usize) -> Vec<Snapshot> {
        self.read(|view| view.recent_snapshots(limit).cloned().collect())
    }

    pub fn get_statistics(&self) -> StoreStatistics {
        self.read(|view| view.statistics())
    }

    pub fn get_snapshot_summary(&self) -> SnapshotSummary {
        self.read(|view| view.snapshot_summary())
    }

    pub fn get_unique_devices_count(&self) -> usize {
        self.read(|view| view.device_count())
    }

    pub fn counters(&self) -> AggregateCounters {
        self.read(|view| view.counters().clone())
    }

    /// Snapshots with `timestamp >= now - seconds`, oldest first.
    pub fn recent_window(&self, seconds: i64, now: i64) -> Vec<Snapshot> {
        let cutoff = now - seconds;
        self.read(|view| {
            view.snapshots()
                .filter(|s| s.timestamp >= cutoff)
                .cloned()
                .collect()
        })
    }

    /// Distinct MACs across snapshots with `timestamp >= now - seconds`.
    pub fn count_unique_in_window(&self, seconds: i64, now: i64) -> usize {
        let cutoff = now - seconds;
        self.read(|view| {
            view.snapshots()
                .filter(|s| s.timestamp >= cutoff)
                .flat_map(|s| s.observations.iter().map(|e| e.mac.as_str()))
                .collect::<HashSet<_>>()
                .len()
        })
    }

    /// Drop every device, snapshot and counter.
    pub fn clear(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.devices.clear();
        inner.snapshots.clear();
        inner.counters.reset();
    }
}

impl Default for PresenceStore {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

fn evict_oldest(devices: &mut HashMap<String, DeviceSummary>) {
    let oldest = devices
        .values()
        .min_by(|a, b| a.last_seen.cmp(&b.last_seen).then_with(|| a.mac.cmp(&b.mac)))
        .map(|summary| summary.mac.clone());

    if let Some(mac) = oldest {
        devices.remove(&mac);
        debug!(mac = %mac, "Evicted oldest device at capacity");
    }
}

/// Borrowed read-only view of the store, valid while its lock is held.
#[derive(Clone, Copy)]
pub struct StoreView<'a> {
    inner: &'a StoreInner,
}

impl<'a> StoreView<'a> {
    pub fn device_count(self) -> usize {
        self.inner.devices.len()
    }

    pub fn snapshot_count(self) -> usize {
        self.inner.snapshots.len()
    }

    pub fn devices(self) -> impl Iterator<Item = &'a DeviceSummary> + 'a {
        self.inner.devices.values()
    }

    /// Device by MAC in any notation the classifier accepts.
    pub fn device(self, mac: &str) -> Option<&'a DeviceSummary> {
        let key = mac.trim().to_lowercase();
        self.inner.devices.get(&key).or_else(|| {
            normalize_mac(&key).and_then(|canonical| self.inner.devices.get(&canonical))
        })
    }

    /// All snapshots, oldest first.
    pub fn snapshots(self) -> impl DoubleEndedIterator<Item = &'a Snapshot> + ExactSizeIterator + 'a {
        self.inner.snapshots.iter()
    }

    /// The last `limit` snapshots, oldest first.
    pub fn recent_snapshots(self, limit: usize) -> impl Iterator<Item = &'a Snapshot> + 'a {
        let len = self.inner.snapshots.len();
        self.inner.snapshots.iter().skip(len.saturating_sub(limit))
    }

    pub fn counters(self) -> &'a AggregateCounters {
        &self.inner.counters
    }

    /// Devices sorted by `last_seen` descending. `Some(0)` yields nothing.
    pub fn devices_by_recency(self, limit: Option<usize>) -> Vec<&'a DeviceSummary> {
        let mut devices: Vec<&DeviceSummary> = self.inner.devices.values().collect();
        devices.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.mac.cmp(&b.mac)));
        if let Some(limit) = limit {
            devices.truncate(limit);
        }
        devices
    }

    /// Latest data timestamp: max over every `last_seen` and snapshot time.
    pub fn latest_timestamp(self) -> Option<i64> {
        let devices = self.inner.devices.values().map(|d| d.last_seen);
        let snapshots = self.inner.snapshots.iter().map(|s| s.timestamp);
        devices.chain(snapshots).max()
    }

    pub fn statistics(self) -> StoreStatistics {
        let counters = &self.inner.counters;
        StoreStatistics {
            total_messages: counters.total_messages,
            total_devices: counters.total_devices_ever_seen,
            first_message_time: counters.first_message_time,
            last_message_time: counters.last_message_time,
            current_devices: self.device_count(),
            timestamps_count: self.snapshot_count(),
            peak_snapshot_count: counters.peak_snapshot_unique_count,
            last_snapshot_count: counters.last_snapshot_unique_count,
        }
    }

    pub fn snapshot_summary(self) -> SnapshotSummary {
        SnapshotSummary {
            peak_all_time: self.inner.counters.peak_snapshot_unique_count,
            last_snapshot: self.inner.counters.last_snapshot_unique_count,
            total_unique: self.device_count(),
        }
    }
}
