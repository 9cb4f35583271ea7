//! Records held and produced by the presence store.
//!
//! Timestamps are unix seconds as reported by the scanner.

use crate::classifier::{Classification, DeviceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One device seen in one scanner payload, after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceObservation {
    pub mac: String,
    pub rssi: i32,
    pub timestamp: i64,
    /// Randomization flag exactly as the scanner sent it
    pub randomization_flag: Option<i64>,
    pub vendor: Option<String>,
    pub device_type: DeviceType,
    pub device_brand: Option<String>,
    pub randomized: bool,
}

impl DeviceObservation {
    /// An observation that has not been classified yet.
    pub fn new(mac: impl Into<String>, rssi: i32, timestamp: i64) -> Self {
        Self {
            mac: mac.into(),
            rssi,
            timestamp,
            randomization_flag: None,
            vendor: None,
            device_type: DeviceType::Other,
            device_brand: None,
            randomized: false,
        }
    }

    /// Attach classification results, adopting the normalized MAC when the
    /// classifier produced one.
    pub fn with_classification(mut self, classification: Classification) -> Self {
        if let Some(mac) = classification.mac {
            self.mac = mac;
        }
        self.vendor = classification.vendor;
        self.device_type = classification.device_type;
        self.device_brand = classification.device_brand;
        self.randomized = classification.randomized;
        self
    }
}

/// Everything known about one MAC address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub mac: String,
    pub first_seen: i64,
    pub last_seen: i64,
    /// Number of observations recorded for this MAC
    #[serde(rename = "count")]
    pub occurrence_count: u64,
    /// Strongest signal ever observed
    pub best_rssi: i32,
    /// Signal of the most recent observation
    pub latest_rssi: i32,
    pub vendor: Option<String>,
    pub device_type: DeviceType,
    pub device_brand: Option<String>,
    pub randomized: bool,
}

impl DeviceSummary {
    pub(crate) fn first_observation(mac: String, obs: &DeviceObservation, timestamp: i64) -> Self {
        Self {
            mac,
            first_seen: timestamp,
            last_seen: timestamp,
            occurrence_count: 1,
            best_rssi: obs.rssi,
            latest_rssi: obs.rssi,
            vendor: obs.vendor.clone(),
            device_type: obs.device_type,
            device_brand: obs.device_brand.clone(),
            randomized: obs.randomized,
        }
    }

    /// Fold a later observation of the same MAC into this summary.
    pub(crate) fn absorb(&mut self, obs: &DeviceObservation, timestamp: i64) {
        self.last_seen = self.last_seen.max(timestamp);
        self.best_rssi = self.best_rssi.max(obs.rssi);
        self.latest_rssi = obs.rssi;
        self.occurrence_count += 1;

        if obs.vendor.is_some() {
            self.vendor = obs.vendor.clone();
        }
        self.device_type = obs.device_type;
        if obs.device_brand.is_some() {
            self.device_brand = obs.device_brand.clone();
        }
        self.randomized = obs.randomized;
    }
}

/// A single `(mac, rssi)` pair inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(rename = "m")]
    pub mac: String,
    #[serde(rename = "r")]
    pub rssi: i32,
}

/// Observations from one payload that share a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "d")]
    pub observations: Vec<SnapshotEntry>,
    pub count: usize,
}

impl Snapshot {
    pub fn new(timestamp: i64, observations: Vec<SnapshotEntry>) -> Self {
        let count = observations.len();
        Self {
            timestamp,
            observations,
            count,
        }
    }

    /// Number of distinct MACs in this snapshot.
    pub fn unique_count(&self) -> usize {
        self.observations
            .iter()
            .map(|entry| entry.mac.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Counters plus current sizes, as reported by the statistics endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_messages: u64,
    /// Distinct MACs ever inserted, including evicted ones
    pub total_devices: u64,
    pub first_message_time: Option<DateTime<Utc>>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub current_devices: usize,
    pub timestamps_count: usize,
    pub peak_snapshot_count: usize,
    pub last_snapshot_count: usize,
}

/// Headline numbers for the dashboard cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Most distinct MACs ever seen in a single payload
    pub peak_all_time: usize,
    /// Distinct MACs in the most recent payload
    pub last_snapshot: usize,
    /// Devices currently tracked
    pub total_unique: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;

    #[test]
    fn test_with_classification_normalizes_mac() {
        let classifier = Classifier::builtin();
        let obs = DeviceObservation::new("00-1E-C2-AA-BB-CC", -60, 100)
            .with_classification(classifier.classify("00-1E-C2-AA-BB-CC", -60, None));
        assert_eq!(obs.mac, "00:1e:c2:aa:bb:cc");
        assert_eq!(obs.device_type, DeviceType::Smartphone);

        // Invalid MACs keep the raw value.
        let obs = DeviceObservation::new("junk", -60, 100)
            .with_classification(classifier.classify("junk", -60, None));
        assert_eq!(obs.mac, "junk");
        assert_eq!(obs.device_type, DeviceType::Other);
    }

    #[test]
    fn test_absorb_keeps_classification_when_empty() {
        let mut obs = DeviceObservation::new("aa:bb:cc:dd:ee:ff", -70, 100);
        obs.vendor = Some("Apple".to_string());
        obs.device_brand = Some("apple".to_string());
        let mut summary = DeviceSummary::first_observation(obs.mac.clone(), &obs, 100);

        let later = DeviceObservation::new("aa:bb:cc:dd:ee:ff", -80, 90);
        summary.absorb(&later, 90);

        assert_eq!(summary.first_seen, 100);
        assert_eq!(summary.last_seen, 100);
        assert_eq!(summary.best_rssi, -70);
        assert_eq!(summary.latest_rssi, -80);
        assert_eq!(summary.occurrence_count, 2);
        assert_eq!(summary.vendor.as_deref(), Some("Apple"));
        assert_eq!(summary.device_brand.as_deref(), Some("apple"));
    }

    #[test]
    fn test_snapshot_wire_names() {
        let snapshot = Snapshot::new(
            1_700_000_000,
            vec![SnapshotEntry {
                mac: "aa:bb:cc:dd:ee:ff".to_string(),
                rssi: -63,
            }],
        );
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["t"], 1_700_000_000);
        assert_eq!(json["d"][0]["m"], "aa:bb:cc:dd:ee:ff");
        assert_eq!(json["d"][0]["r"], -63);
        assert_eq!(json["count"], 1);
    }

    #[test]
    fn test_unique_count_ignores_repeats() {
        let entry = |mac: &str| SnapshotEntry {
            mac: mac.to_string(),
            rssi: -50,
        };
        let snapshot = Snapshot::new(1, vec![entry("a"), entry("b"), entry("a")]);
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.unique_count(), 2);
    }
}
