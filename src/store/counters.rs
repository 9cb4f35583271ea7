//! Running aggregate counters for the presence store.
//!
//! Counters survive device eviction and snapshot trimming; only
//! [`AggregateCounters::reset`] clears them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate counters. Guarded by the store lock, so plain integers suffice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounters {
    /// Number of `add` calls, including empty ones
    pub total_messages: u64,
    /// Distinct MACs ever inserted
    pub total_devices_ever_seen: u64,
    pub first_message_time: Option<DateTime<Utc>>,
    pub last_message_time: Option<DateTime<Utc>>,
    /// Largest distinct-MAC count of any single batch
    pub peak_snapshot_unique_count: usize,
    /// Distinct-MAC count of the latest batch
    pub last_snapshot_unique_count: usize,
}

impl AggregateCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming message at `now`.
    pub fn record_message(&mut self, now: DateTime<Utc>) {
        self.total_messages += 1;
        if self.first_message_time.is_none() {
            self.first_message_time = Some(now);
        }
        self.last_message_time = Some(now);
    }

    /// Record the insertion of a MAC not currently tracked.
    pub fn record_new_device(&mut self) {
        self.total_devices_ever_seen += 1;
    }

    /// Record the distinct-MAC count of a batch.
    pub fn record_batch(&mut self, unique_macs: usize) {
        self.last_snapshot_unique_count = unique_macs;
        self.peak_snapshot_unique_count = self.peak_snapshot_unique_count.max(unique_macs);
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let fmt_time = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        };
        format!(
            "Presence Statistics:\n\
             - Messages received: {}\n\
             - Devices ever seen: {}\n\
             - Peak devices in one scan: {}\n\
             - Devices in last scan: {}\n\
             - First message: {}\n\
             - Last message: {}",
            self.total_messages,
            self.total_devices_ever_seen,
            self.peak_snapshot_unique_count,
            self.last_snapshot_unique_count,
            fmt_time(self.first_message_time),
            fmt_time(self.last_message_time),
        )
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
