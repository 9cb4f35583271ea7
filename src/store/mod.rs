//! In-memory presence store.
//!
//! This module contains:
//! - Device summaries and snapshot records
//! - Aggregate counters
//! - The bounded, lock-guarded store itself

pub mod counters;
pub mod presence;
pub mod types;

// Re-export commonly used types
pub use counters::AggregateCounters;
pub use presence::{PresenceStore, SharedStore, StoreView};
pub use types::{
    DeviceObservation, DeviceSummary, Snapshot, SnapshotEntry, SnapshotSummary, StoreStatistics,
};
