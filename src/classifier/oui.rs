//! OUI (vendor prefix) lookup.
//!
//! The vendor registry is static reference data. It is built once at startup
//! into an immutable [`OuiTable`] and then shared read-only by every thread.

use crate::classifier::mac::MacAddress;
use std::collections::HashMap;
use std::path::Path;

/// Source of vendor names keyed by OUI.
pub trait VendorLookup: Send + Sync {
    /// Raw registry name for the address prefix, if known.
    fn lookup(&self, mac: &MacAddress) -> Option<&str>;
}

/// Built-in registry excerpt: the vendors the device rules know about.
const BUILTIN_REGISTRY: &[(&str, &str)] = &[
    // Apple
    ("00:1e:c2", "Apple, Inc."),
    ("00:23:df", "Apple, Inc."),
    ("00:25:00", "Apple, Inc."),
    ("04:0c:ce", "Apple, Inc."),
    ("04:15:52", "Apple, Inc."),
    ("28:cf:e9", "Apple, Inc."),
    ("3c:15:c2", "Apple, Inc."),
    ("a4:5e:60", "Apple, Inc."),
    ("ac:bc:32", "Apple, Inc."),
    ("f0:18:98", "Apple, Inc."),
    // Samsung
    ("00:12:fb", "Samsung Electronics Co.,Ltd"),
    ("00:15:99", "Samsung Electronics Co.,Ltd"),
    ("00:16:32", "Samsung Electronics Co.,Ltd"),
    ("00:16:6b", "Samsung Electronics Co.,Ltd"),
    ("00:17:c9", "Samsung Electronics Co.,Ltd"),
    ("5c:0a:5b", "SAMSUNG ELECTRO-MECHANICS CO., LTD."),
    // Other handset makers
    ("64:09:80", "Xiaomi Communications Co Ltd"),
    ("28:6c:07", "Xiaomi Communications Co Ltd"),
    ("f8:a4:5f", "Xiaomi Communications Co Ltd"),
    ("00:e0:fc", "HUAWEI TECHNOLOGIES CO.,LTD"),
    ("00:18:82", "HUAWEI TECHNOLOGIES CO.,LTD"),
    ("3c:5a:b4", "Google, Inc."),
    ("f4:f5:d8", "Google, Inc."),
    ("94:65:2d", "OnePlus Technology (Shenzhen) Co., Ltd"),
    ("9c:d9:17", "Motorola Mobility LLC, a Lenovo Company"),
    ("30:39:26", "Sony Mobile Communications Inc"),
    // Tablets / e-readers
    ("f0:27:2d", "Amazon Technologies Inc."),
    ("74:c2:46", "Amazon Technologies Inc."),
    // Wi-Fi chip and laptop OEMs
    ("00:1b:21", "Intel Corporate"),
    ("00:1e:67", "Intel Corporate"),
    ("00:1f:3c", "Intel Corporate"),
    ("00:21:5c", "Intel Corporate"),
    ("00:22:fa", "Intel Corporate"),
    ("00:24:d7", "Intel Corporate"),
    ("00:26:c7", "Intel Corporate"),
    ("74:c6:3b", "AzureWave Technology Inc."),
    ("80:a5:89", "AzureWave Technology Inc."),
    ("00:22:68", "Hon Hai Precision Ind. Co.,Ltd."),
    ("00:1a:a0", "Dell Inc."),
    ("00:1e:c9", "Dell Inc."),
    ("00:21:70", "Dell Inc."),
    ("00:24:e8", "Dell Inc."),
    ("00:26:b9", "Dell Inc."),
    ("00:1f:29", "Hewlett Packard"),
    ("00:21:5a", "Hewlett Packard"),
    ("00:23:5a", "Hewlett Packard"),
    ("00:24:81", "Hewlett Packard"),
    ("00:21:cc", "Lenovo"),
    ("00:50:f2", "Microsoft Corporation"),
    // IoT, cameras, network gear
    ("24:0a:c4", "Espressif Inc."),
    ("30:ae:a4", "Espressif Inc."),
    ("a4:cf:12", "Espressif Inc."),
    ("b8:27:eb", "Raspberry Pi Foundation"),
    ("dc:a6:32", "Raspberry Pi Trading Ltd"),
    ("44:19:b6", "Hangzhou Hikvision Digital Technology Co.,Ltd."),
    ("50:c7:bf", "TP-LINK TECHNOLOGIES CO.,LTD."),
    ("f4:f2:6d", "TP-LINK TECHNOLOGIES CO.,LTD."),
    ("24:a4:3c", "Ubiquiti Networks Inc."),
];

/// Immutable OUI -> vendor map.
#[derive(Debug, Clone, Default)]
pub struct OuiTable {
    entries: HashMap<[u8; 3], String>,
}

impl OuiTable {
    /// An empty table (every lookup misses).
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry excerpt compiled into the binary.
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN_REGISTRY.iter().copied())
    }

    /// Build a table from `(prefix, vendor)` pairs.
    ///
    /// Prefixes use any MAC notation. Invalid prefixes are skipped and the
    /// first entry for a duplicated prefix wins.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut table = Self::new();
        for (prefix, vendor) in entries {
            match parse_prefix(prefix) {
                Some(oui) => {
                    table
                        .entries
                        .entry(oui)
                        .or_insert_with(|| vendor.trim().to_string());
                }
                None => tracing::debug!(prefix, "Skipping invalid OUI prefix"),
            }
        }
        table
    }

    /// Parse registry text.
    ///
    /// Accepts one entry per line as `prefix,vendor`, `prefix<TAB>vendor`, or
    /// the IEEE `XX-XX-XX   (hex)\t\tVendor` layout. Blank lines and lines
    /// starting with `#` are ignored.
    pub fn parse(text: &str) -> Self {
        let pairs = text.lines().filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            if let Some((prefix, vendor)) = line.split_once("(hex)") {
                return Some((prefix.trim(), vendor.trim()));
            }
            line.split_once(',')
                .or_else(|| line.split_once('\t'))
                .map(|(prefix, vendor)| (prefix.trim(), vendor.trim()))
        });
        Self::from_entries(pairs)
    }

    /// Read a registry file in any layout [`parse`](Self::parse) accepts.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    /// Merge another table into this one; existing entries are kept.
    pub fn extend(&mut self, other: OuiTable) {
        for (oui, vendor) in other.entries {
            self.entries.entry(oui).or_insert(vendor);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VendorLookup for OuiTable {
    fn lookup(&self, mac: &MacAddress) -> Option<&str> {
        self.entries.get(&mac.oui()).map(String::as_str)
    }
}

fn parse_prefix(prefix: &str) -> Option<[u8; 3]> {
    // Pad the prefix to a full address so the MAC parser does the work.
    MacAddress::parse(&format!("{}000000", prefix.trim())).map(|mac| mac.oui())
}

/// Registry keyword -> display name, first match wins.
const SHORT_NAMES: &[(&str, &str)] = &[
    ("apple", "Apple"),
    ("samsung electronics", "Samsung"),
    ("samsung electro-mechanics", "Samsung"),
    ("xiaomi", "Xiaomi"),
    ("beijing xiaomi", "Xiaomi"),
    ("huawei", "Huawei"),
    ("honor device", "Honor"),
    ("google", "Google"),
    ("oneplus", "OnePlus"),
    ("oppo", "OPPO"),
    ("realme", "Realme"),
    ("vivo mobile", "Vivo"),
    ("vivo", "Vivo"),
    ("motorola", "Motorola"),
    ("lenovo", "Lenovo"),
    ("sony", "Sony"),
    ("lg electronics", "LG"),
    ("lg innotek", "LG"),
    ("zte", "ZTE"),
    ("meizu", "Meizu"),
    ("nokia", "Nokia"),
    ("hmd global", "Nokia"),
    ("asus", "ASUS"),
    ("tcl", "TCL"),
    ("nothing technology", "Nothing"),
    ("intel corporate", "Intel"),
    ("intel", "Intel"),
    ("azurewave", "AzureWave"),
    ("liteon", "Liteon"),
    ("qualcomm", "Qualcomm"),
    ("mediatek", "MediaTek"),
    ("dell", "Dell"),
    ("hewlett packard", "HP"),
    ("hp inc", "HP"),
    ("microsoft", "Microsoft"),
    ("cloud network technology", "Foxconn"),
    ("cloud network tech", "Foxconn"),
    ("hon hai", "Foxconn"),
    ("foxconn", "Foxconn"),
    ("fibocom", "Fibocom"),
    ("amazon", "Amazon"),
    ("fitbit", "Fitbit"),
    ("garmin", "Garmin"),
    ("espressif", "Espressif"),
    ("raspberry pi", "Raspberry Pi"),
    ("hikvision", "Hikvision"),
    ("dahua", "Dahua"),
    ("tp-link", "TP-Link"),
    ("ubiquiti", "Ubiquiti"),
];

/// Legal-form suffixes stripped from unknown vendor names (first match only).
const LEGAL_SUFFIXES: &[&str] = &[
    " Co.,Ltd",
    " Co., Ltd.",
    " Inc.",
    " Corp.",
    " Corporation",
    " PTE. LTD.",
    " Pte. Ltd.",
    " Ltd.",
    " Ltd",
    " LLC",
    " GmbH",
    " AG",
    " S.A.",
    " Limited",
];

/// Shorten a registry vendor name for display.
///
/// `"Samsung Electronics Co.,Ltd"` becomes `"Samsung"`; names without a known
/// keyword lose their legal-form suffix instead.
pub fn short_vendor_name(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if let Some((_, short)) = SHORT_NAMES.iter().find(|(key, _)| lower.contains(key)) {
        return (*short).to_string();
    }

    let mut name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some(suffix) = LEGAL_SUFFIXES.iter().find(|s| name.ends_with(*s)) {
        name.truncate(name.len() - suffix.len());
    }
    name.trim().to_string()
}
