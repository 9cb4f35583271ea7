//! Payload normalization: parse, classify, filter.
//!
//! Malformed payloads never produce an error here. They degrade to an empty
//! observation list so the store still records the message.

use crate::classifier::{DeviceType, SharedClassifier};
use crate::config::FilterConfig;
use crate::ingest::wire::WireMessage;
use crate::store::DeviceObservation;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Longest payload excerpt included in warnings.
const PAYLOAD_PREVIEW_CHARS: usize = 120;

/// Device-type allow-list applied after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPolicy {
    enabled: bool,
    allowed: HashSet<DeviceType>,
}

impl FilterPolicy {
    /// A policy that keeps everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            allowed: HashSet::new(),
        }
    }

    pub fn allow(types: impl IntoIterator<Item = DeviceType>) -> Self {
        Self {
            enabled: true,
            allowed: types.into_iter().collect(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        if config.enabled {
            Self::allow(config.allowed_types.iter().copied())
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn keeps(&self, device_type: DeviceType) -> bool {
        !self.enabled || self.allowed.contains(&device_type)
    }
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Result of normalizing one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    /// Observations that passed the filter, ready for the store
    pub observations: Vec<DeviceObservation>,
    /// Item entries found in the payload
    pub received: usize,
    /// Entries that parsed and were classified
    pub enriched: usize,
    /// Entries kept after filtering
    pub kept: usize,
}

/// Turns raw scanner payloads into classified observations.
#[derive(Debug, Clone)]
pub struct Normalizer {
    classifier: SharedClassifier,
    filter: FilterPolicy,
}

impl Normalizer {
    pub fn new(classifier: SharedClassifier, filter: FilterPolicy) -> Self {
        Self { classifier, filter }
    }

    pub fn classifier(&self) -> &SharedClassifier {
        &self.classifier
    }

    pub fn filter(&self) -> &FilterPolicy {
        &self.filter
    }

    /// Parse and classify a payload, without filtering.
    pub fn parse(&self, payload: &[u8]) -> Vec<DeviceObservation> {
        self.parse_at(payload, Utc::now().timestamp())
    }

    /// Like [`parse`](Self::parse), stamping timestamp-less items with `now`.
    pub fn parse_at(&self, payload: &[u8], now: i64) -> Vec<DeviceObservation> {
        self.decode_and_enrich(payload, now).1
    }

    /// Parse, classify and filter a payload.
    pub fn process(&self, payload: &[u8]) -> NormalizedBatch {
        self.process_at(payload, Utc::now().timestamp())
    }

    pub fn process_at(&self, payload: &[u8], now: i64) -> NormalizedBatch {
        let (received, enriched) = self.decode_and_enrich(payload, now);
        let enriched_count = enriched.len();

        let observations: Vec<DeviceObservation> = enriched
            .into_iter()
            .filter(|obs| self.filter.keeps(obs.device_type))
            .collect();

        if self.filter.is_enabled() && observations.len() < enriched_count {
            debug!(
                dropped = enriched_count - observations.len(),
                "Filtered observations by device type"
            );
        }
        info!(
            received,
            enriched = enriched_count,
            kept = observations.len(),
            "Processed payload"
        );

        NormalizedBatch {
            kept: observations.len(),
            observations,
            received,
            enriched: enriched_count,
        }
    }

    fn decode_and_enrich(&self, payload: &[u8], now: i64) -> (usize, Vec<DeviceObservation>) {
        let message = match WireMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, payload = %preview(payload), "Dropping malformed payload");
                return (0, Vec::new());
            }
        };

        let observations = message
            .observations()
            .into_iter()
            .map(|raw| {
                let classification =
                    self.classifier
                        .classify(&raw.mac, raw.rssi, raw.randomization_flag);
                let mut obs = DeviceObservation::new(raw.mac, raw.rssi, raw.timestamp.unwrap_or(now));
                obs.randomization_flag = raw.randomization_flag;
                obs.with_classification(classification)
            })
            .collect();

        (message.item_count(), observations)
    }
}

fn preview(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .chars()
        .take(PAYLOAD_PREVIEW_CHARS)
        .collect()
}
