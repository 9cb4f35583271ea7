//! MAC address parsing and normalization.
//!
//! Scanners report addresses in whatever notation the firmware prefers
//! (`AA:BB:..`, `aa-bb-..`, `aabb.ccdd.eeff`). Everything downstream keys on
//! one canonical form: lowercase, colon-separated hex octets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Locally Administered Address bit in the first octet.
const LAA_BIT: u8 = 0x02;

/// Separators accepted between hex digits.
const SEPARATORS: [char; 3] = [':', '-', '.'];

/// A validated 48-bit MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Parse an address in any common notation.
    ///
    /// Returns `None` unless exactly 12 hex digits remain after the
    /// separators are removed.
    pub fn parse(input: &str) -> Option<Self> {
        let digits: Vec<u8> = input
            .trim()
            .chars()
            .filter(|c| !SEPARATORS.contains(c))
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()?;

        if digits.len() != 12 {
            return None;
        }

        let mut octets = [0u8; 6];
        for (i, pair) in digits.chunks(2).enumerate() {
            octets[i] = (pair[0] << 4) | pair[1];
        }
        Some(Self(octets))
    }

    /// Organizationally Unique Identifier (first three octets).
    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    /// Whether the LAA bit is set, which is how randomized probe-request
    /// addresses present themselves.
    pub fn is_locally_administered(&self) -> bool {
        self.0[0] & LAA_BIT != 0
    }

    /// Randomized unless the scanner says otherwise: a hint of `0` means
    /// real, any other hint means randomized, and no hint defers to the
    /// LAA bit.
    pub fn is_randomized(&self, hint: Option<i64>) -> bool {
        match hint {
            Some(flag) => flag != 0,
            None => self.is_locally_administered(),
        }
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Normalize a MAC address to lowercase colon-separated form.
pub fn normalize_mac(input: &str) -> Option<String> {
    MacAddress::parse(input).map(|mac| mac.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notations() {
        let expected = "aa:bb:cc:dd:ee:ff";
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF").as_deref(), Some(expected));
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff").as_deref(), Some(expected));
        assert_eq!(normalize_mac("aabb.ccdd.eeff").as_deref(), Some(expected));
        assert_eq!(normalize_mac("aabbccddeeff").as_deref(), Some(expected));
        assert_eq!(normalize_mac("  aa:bb:cc:dd:ee:ff ").as_deref(), Some(expected));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(MacAddress::parse("").is_none());
        assert!(MacAddress::parse("aa:bb:cc:dd:ee").is_none());
        assert!(MacAddress::parse("aa:bb:cc:dd:ee:ff:00").is_none());
        assert!(MacAddress::parse("zz:bb:cc:dd:ee:ff").is_none());
        assert!(MacAddress::parse("not a mac").is_none());
    }

    #[test]
    fn test_normalize_idempotent() {
        for raw in ["00:1E:C2:AA:BB:CC", "02-00-00-aa-bb-cc", "f0f1.f2f3.f4f5"] {
            let once = normalize_mac(raw).unwrap();
            let twice = normalize_mac(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_oui_and_laa() {
        let mac = MacAddress::parse("02:00:00:aa:bb:cc").unwrap();
        assert_eq!(mac.oui(), [0x02, 0x00, 0x00]);
        assert!(mac.is_locally_administered());

        let mac = MacAddress::parse("00:1e:c2:aa:bb:cc").unwrap();
        assert!(!mac.is_locally_administered());
    }

    #[test]
    fn test_hint_overrides_laa_bit() {
        let local = MacAddress::parse("02:00:00:aa:bb:cc").unwrap();
        let vendor = MacAddress::parse("00:1e:c2:aa:bb:cc").unwrap();

        // LAA bit set, but the scanner says it is a real address.
        assert!(!local.is_randomized(Some(0)));
        // LAA bit clear, but the scanner says randomized.
        assert!(vendor.is_randomized(Some(1)));
        assert!(vendor.is_randomized(Some(7)));

        assert!(local.is_randomized(None));
        assert!(!vendor.is_randomized(None));
    }
}
