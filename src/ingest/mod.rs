//! Payload ingestion.
//!
//! This module contains:
//! - Wire format decoding (list and object shapes)
//! - The normalizer that classifies and filters observations
//! - The worker thread feeding the store from a payload queue

pub mod normalizer;
pub mod wire;
pub mod worker;

// Re-export commonly used types
pub use normalizer::{FilterPolicy, NormalizedBatch, Normalizer};
pub use wire::{RawObservation, WireError, WireMessage};
pub use worker::{IngestError, IngestReport, IngestWorker, Ingestor, PayloadSender};
