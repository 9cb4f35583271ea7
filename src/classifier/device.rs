//! Device type and brand classification.
//!
//! The vendor name resolved from the OUI is matched against an ordered
//! keyword list. Order matters: the first keyword contained in the vendor
//! string wins, regardless of how long the other matches are.

use crate::classifier::mac::MacAddress;
use crate::classifier::oui::{short_vendor_name, OuiTable, VendorLookup};
use crate::config::{ClassifierConfig, ConfigError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Coarse device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Smartphone,
    Tablet,
    Laptop,
    Smartwatch,
    Iot,
    #[default]
    Other,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Smartphone => "smartphone",
            DeviceType::Tablet => "tablet",
            DeviceType::Laptop => "laptop",
            DeviceType::Smartwatch => "smartwatch",
            DeviceType::Iot => "iot",
            DeviceType::Other => "other",
        }
    }

    pub fn all() -> [DeviceType; 6] {
        [
            DeviceType::Smartphone,
            DeviceType::Tablet,
            DeviceType::Laptop,
            DeviceType::Smartwatch,
            DeviceType::Iot,
            DeviceType::Other,
        ]
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DeviceType::all()
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown device type '{s}'"))
    }
}

/// Result of classifying one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Normalized address, or `None` if the input was not a valid MAC
    pub mac: Option<String>,
    pub rssi: i32,
    pub randomized: bool,
    /// Short vendor display name
    pub vendor: Option<String>,
    pub device_type: DeviceType,
    pub device_brand: Option<String>,
}

impl Classification {
    fn unknown(rssi: i32) -> Self {
        Self {
            mac: None,
            rssi,
            randomized: false,
            vendor: None,
            device_type: DeviceType::Other,
            device_brand: None,
        }
    }
}

// (keyword, device type, brand)
const VENDOR_KEYWORDS: &[(&str, DeviceType, Option<&str>)] = &[
    // Smartphones
    ("apple", DeviceType::Smartphone, Some("apple")),
    ("samsung electronics", DeviceType::Smartphone, Some("samsung")),
    ("samsung electro-mechanics", DeviceType::Smartphone, Some("samsung")),
    ("xiaomi", DeviceType::Smartphone, Some("xiaomi")),
    ("huawei", DeviceType::Smartphone, Some("huawei")),
    ("honor device", DeviceType::Smartphone, Some("honor")),
    ("honor", DeviceType::Smartphone, Some("honor")),
    ("google", DeviceType::Smartphone, Some("google")),
    ("oneplus", DeviceType::Smartphone, Some("oneplus")),
    ("oppo", DeviceType::Smartphone, Some("oppo")),
    ("realme", DeviceType::Smartphone, Some("realme")),
    ("vivo mobile", DeviceType::Smartphone, Some("vivo")),
    ("vivo", DeviceType::Smartphone, Some("vivo")),
    ("motorola", DeviceType::Smartphone, Some("motorola")),
    ("lenovo", DeviceType::Smartphone, Some("lenovo")),
    ("sony mobile", DeviceType::Smartphone, Some("sony")),
    ("sony", DeviceType::Smartphone, Some("sony")),
    ("lg electronics", DeviceType::Smartphone, Some("lg")),
    ("lg innotek", DeviceType::Smartphone, Some("lg")),
    ("zte", DeviceType::Smartphone, Some("zte")),
    ("meizu", DeviceType::Smartphone, Some("meizu")),
    ("nokia", DeviceType::Smartphone, Some("nokia")),
    ("hmd global", DeviceType::Smartphone, Some("nokia")),
    ("asus", DeviceType::Smartphone, Some("asus")),
    ("tcl", DeviceType::Smartphone, Some("tcl")),
    ("nothing technology", DeviceType::Smartphone, Some("nothing")),
    // Tablets
    ("amazon", DeviceType::Tablet, Some("amazon")),
    // Wi-Fi chips that mostly ship inside laptops
    ("intel corporate", DeviceType::Laptop, None),
    ("intel", DeviceType::Laptop, None),
    ("azurewave", DeviceType::Laptop, None),
    ("liteon", DeviceType::Laptop, None),
    ("rivet networks", DeviceType::Laptop, None),
    ("qualcomm", DeviceType::Laptop, None),
    ("mediatek", DeviceType::Laptop, None),
    ("dell", DeviceType::Laptop, Some("dell")),
    ("hewlett packard", DeviceType::Laptop, Some("hp")),
    ("hp inc", DeviceType::Laptop, Some("hp")),
    ("microsoft", DeviceType::Laptop, Some("microsoft")),
    ("cloud network technology", DeviceType::Laptop, None),
    ("hon hai", DeviceType::Laptop, None),
    ("foxconn", DeviceType::Laptop, None),
    ("wistron", DeviceType::Laptop, None),
    ("compal", DeviceType::Laptop, None),
    ("quanta", DeviceType::Laptop, None),
    ("pegatron", DeviceType::Laptop, None),
    ("fibocom", DeviceType::Laptop, None),
    // Wearables
    ("fitbit", DeviceType::Smartwatch, Some("fitbit")),
    ("garmin", DeviceType::Smartwatch, Some("garmin")),
    // IoT, cameras, routers
    ("espressif", DeviceType::Iot, None),
    ("raspberry pi", DeviceType::Iot, None),
    ("hikvision", DeviceType::Iot, None),
    ("dahua", DeviceType::Iot, None),
    ("tuya", DeviceType::Iot, None),
    ("shenzhen ogemray", DeviceType::Iot, None),
    ("tp-link", DeviceType::Iot, None),
    ("ubiquiti", DeviceType::Iot, None),
];

/// Map a raw vendor name to `(type, brand)` using the keyword list.
pub fn classify_vendor(vendor_raw: &str) -> (DeviceType, Option<String>) {
    let lower = vendor_raw.to_lowercase();
    VENDOR_KEYWORDS
        .iter()
        .find(|(keyword, _, _)| lower.contains(keyword))
        .map(|(_, device_type, brand)| (*device_type, brand.map(str::to_string)))
        .unwrap_or((DeviceType::Other, None))
}

/// Thread-safe handle to a classifier.
pub type SharedClassifier = Arc<Classifier>;

/// Classifies addresses against an immutable vendor registry.
pub struct Classifier {
    vendors: Box<dyn VendorLookup>,
}

impl Classifier {
    pub fn new(vendors: impl VendorLookup + 'static) -> Self {
        Self {
            vendors: Box::new(vendors),
        }
    }

    /// Classifier over the built-in registry excerpt.
    pub fn builtin() -> Self {
        Self::new(OuiTable::builtin())
    }

    /// Classifier over the configured registry.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.vendor_table()?))
    }

    /// Short display name of the vendor owning this address's OUI.
    pub fn vendor_of(&self, mac: &str) -> Option<String> {
        let mac = MacAddress::parse(mac)?;
        self.vendors.lookup(&mac).map(short_vendor_name)
    }

    /// Classify one observed address.
    ///
    /// Invalid addresses yield an all-empty classification with type
    /// [`DeviceType::Other`]. A `randomization_hint` overrides the LAA bit.
    pub fn classify(&self, mac: &str, rssi: i32, randomization_hint: Option<i64>) -> Classification {
        let Some(parsed) = MacAddress::parse(mac) else {
            return Classification::unknown(rssi);
        };

        let randomized = parsed.is_randomized(randomization_hint);
        let vendor_raw = self.vendors.lookup(&parsed);

        let (device_type, device_brand) = match vendor_raw {
            Some(raw) => {
                let (device_type, brand) = classify_vendor(raw);
                // A randomized address says nothing about the hardware, even
                // when the prefix belongs to a laptop chip vendor.
                if device_type == DeviceType::Laptop && randomized {
                    (DeviceType::Other, None)
                } else {
                    (device_type, brand)
                }
            }
            // Randomized probe requests overwhelmingly come from phones.
            None if randomized => (DeviceType::Smartphone, None),
            None => (DeviceType::Other, None),
        };

        Classification {
            mac: Some(parsed.to_string()),
            rssi,
            randomized,
            vendor: vendor_raw.map(short_vendor_name),
            device_type,
            device_brand,
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}
