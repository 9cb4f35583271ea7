//! Device classification from MAC addresses.
//!
//! This module contains:
//! - MAC parsing and normalization
//! - The OUI vendor registry
//! - Keyword rules deriving device type and brand from the vendor

pub mod device;
pub mod mac;
pub mod oui;

// Re-export commonly used types
pub use device::{classify_vendor, Classification, Classifier, DeviceType, SharedClassifier};
pub use mac::{normalize_mac, MacAddress};
pub use oui::{short_vendor_name, OuiTable, VendorLookup};
