//! Wi-Fi Presence Agent - presence aggregation for probe-request scanners.
//!
//! A scanner periodically reports the devices it hears (MAC, signal,
//! timestamp). This library classifies each device, keeps a bounded
//! in-memory history of who was seen when, and serves aggregated presence
//! statistics to a dashboard.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Wi-Fi Presence Agent                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  raw payload                                                  │
//! │       │                                                       │
//! │       ▼                                                       │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────────┐     │
//! │  │   Ingest    │──▶│ Classifier  │   │  PresenceStore  │     │
//! │  │ (normalize) │◀──│  (OUI/LAA)  │   │ devices + ring  │     │
//! │  └─────────────┘   └─────────────┘   └─────────────────┘     │
//! │         │                                  ▲     │            │
//! │         └────────────── add ───────────────┘     │ read       │
//! │                                                  ▼            │
//! │                                          ┌─────────────┐      │
//! │                                          │   Query     │      │
//! │                                          │  (series)   │      │
//! │                                          └─────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wifi_presence_agent::{
//!     Classifier, FilterPolicy, Ingestor, Normalizer, PresenceStore, QueryService,
//! };
//!
//! let store = PresenceStore::new(10_000, 1_000).shared();
//! let normalizer = Normalizer::new(Arc::new(Classifier::builtin()), FilterPolicy::disabled());
//! let ingestor = Ingestor::new(normalizer, store.clone());
//!
//! ingestor.handle_payload(br#"[{"m":"00:1e:c2:aa:bb:cc","r":-63,"t":1700000000}]"#);
//!
//! let query = QueryService::new(store);
//! assert_eq!(query.summary().unwrap().total_unique, 1);
//! ```

pub mod classifier;
pub mod config;
pub mod ingest;
pub mod query;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use classifier::{Classification, Classifier, DeviceType, MacAddress, OuiTable, VendorLookup};
pub use config::{Config, ConfigError};
pub use ingest::{FilterPolicy, IngestError, IngestWorker, Ingestor, Normalizer, PayloadSender};
pub use query::{QueryError, QueryService, SeriesMode, Timeframe};
pub use store::{DeviceObservation, DeviceSummary, PresenceStore, SharedStore, Snapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
