//! Scanner wire formats.
//!
//! Two shapes arrive on the wire:
//!
//! ```text
//! list form:   [{"m": "<mac>", "r": -63, "t": 1700000000, "x": 1}, ...]
//! object form: {"t": 1700000000, "d": [{"m": "<mac>", "r": -63, "x": 0}], "c": 1}
//! ```
//!
//! Both are parsed into [`WireMessage`] first and then flattened through one
//! per-item extraction routine.

use serde_json::{Map, Value};
use std::fmt;

/// Keys holding the MAC address, in lookup order.
pub const MAC_KEYS: &[&str] = &["m"];
/// Keys holding the signal strength, in lookup order.
pub const RSSI_KEYS: &[&str] = &["r", "s"];
/// Keys holding a per-item timestamp, in lookup order.
pub const TIMESTAMP_KEYS: &[&str] = &["t"];
/// Keys holding the randomization flag, in lookup order.
pub const RANDOMIZATION_KEYS: &[&str] = &["x"];
/// Keys holding the nested item list of the object form.
pub const ITEMS_KEYS: &[&str] = &["d"];

/// Errors decoding a payload. These never leave the ingest module.
#[derive(Debug)]
pub enum WireError {
    /// Nothing but whitespace
    Empty,
    /// Not valid JSON
    Syntax(serde_json::Error),
    /// Valid JSON, but neither an array nor an object
    UnexpectedRoot(&'static str),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Empty => write!(f, "empty payload"),
            WireError::Syntax(e) => write!(f, "invalid JSON: {e}"),
            WireError::UnexpectedRoot(kind) => write!(f, "unexpected payload root: {kind}"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Syntax(e) => Some(e),
            _ => None,
        }
    }
}

/// A decoded payload, before per-item extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Flat list of items, each with its own timestamp
    ListForm(Vec<Value>),
    /// Root timestamp plus a nested item list
    ObjectForm { root_ts: Option<i64>, items: Vec<Value> },
}

/// One device entry as read off the wire, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservation {
    pub mac: String,
    pub rssi: i32,
    /// Per-item timestamp, else the root timestamp; `None` if neither is positive
    pub timestamp: Option<i64>,
    pub randomization_flag: Option<i64>,
}

impl WireMessage {
    /// Decode raw payload bytes. Undecodable UTF-8 is replaced lossily.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let text = String::from_utf8_lossy(payload);
        let text = text.trim();
        if text.is_empty() {
            return Err(WireError::Empty);
        }

        let root: Value = serde_json::from_str(text).map_err(WireError::Syntax)?;
        Self::from_value(root)
    }

    pub fn from_value(root: Value) -> Result<Self, WireError> {
        match root {
            Value::Array(items) => Ok(WireMessage::ListForm(items)),
            Value::Object(map) => {
                let root_ts = first_of(&map, TIMESTAMP_KEYS).and_then(coerce_int);
                let items = match first_of(&map, ITEMS_KEYS) {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                Ok(WireMessage::ObjectForm { root_ts, items })
            }
            Value::Null => Err(WireError::UnexpectedRoot("null")),
            Value::Bool(_) => Err(WireError::UnexpectedRoot("bool")),
            Value::Number(_) => Err(WireError::UnexpectedRoot("number")),
            Value::String(_) => Err(WireError::UnexpectedRoot("string")),
        }
    }

    /// Number of item entries, valid or not.
    pub fn item_count(&self) -> usize {
        match self {
            WireMessage::ListForm(items) => items.len(),
            WireMessage::ObjectForm { items, .. } => items.len(),
        }
    }

    /// Extract every valid item. Entries without a usable MAC are dropped.
    pub fn observations(&self) -> Vec<RawObservation> {
        let (items, root_ts) = match self {
            WireMessage::ListForm(items) => (items, None),
            WireMessage::ObjectForm { root_ts, items } => (items, *root_ts),
        };
        items
            .iter()
            .filter_map(|item| extract_item(item, root_ts))
            .collect()
    }
}

/// Shared per-item extraction for both wire shapes.
fn extract_item(item: &Value, root_ts: Option<i64>) -> Option<RawObservation> {
    let map = item.as_object()?;

    let mac = match first_of(map, MAC_KEYS) {
        Some(Value::String(mac)) if !mac.trim().is_empty() => mac.trim().to_string(),
        _ => return None,
    };

    let rssi = first_of(map, RSSI_KEYS)
        .and_then(coerce_int)
        .map(clamp_i32)
        .unwrap_or(0);

    let item_ts = first_of(map, TIMESTAMP_KEYS).and_then(coerce_int);
    let timestamp = item_ts.or(root_ts).filter(|ts| *ts > 0);

    let randomization_flag = first_of(map, RANDOMIZATION_KEYS).and_then(coerce_int);

    Some(RawObservation {
        mac,
        rssi,
        timestamp,
        randomization_flag,
    })
}

/// Value of the first key present, in the given order.
fn first_of<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

/// Lenient integer coercion: integers, floats (truncated), numeric strings
/// and booleans. Anything else is `None`.
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_form() {
        let payload = br#"[{"m":"AA:BB:CC:DD:EE:FF","r":-63,"t":1700000000,"x":1},
                           {"m":"11:22:33:44:55:66","r":-80,"t":1700000001}]"#;
        let message = WireMessage::decode(payload).unwrap();
        assert!(matches!(message, WireMessage::ListForm(_)));

        let items = message.observations();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].mac, "AA:BB:CC:DD:EE:FF");
        assert_eq!(items[0].rssi, -63);
        assert_eq!(items[0].timestamp, Some(1_700_000_000));
        assert_eq!(items[0].randomization_flag, Some(1));
        assert_eq!(items[1].randomization_flag, None);
    }

    #[test]
    fn test_object_form_uses_root_timestamp() {
        let payload = br#"{"t":1700000000,"d":[{"m":"aa:bb:cc:dd:ee:ff","r":-50,"x":0},
                                               {"m":"11:22:33:44:55:66","r":-60,"t":1700000005}],"c":2}"#;
        let message = WireMessage::decode(payload).unwrap();
        assert_eq!(
            message,
            WireMessage::ObjectForm {
                root_ts: Some(1_700_000_000),
                items: vec![
                    json!({"m":"aa:bb:cc:dd:ee:ff","r":-50,"x":0}),
                    json!({"m":"11:22:33:44:55:66","r":-60,"t":1700000005}),
                ],
            }
        );

        let items = message.observations();
        assert_eq!(items[0].timestamp, Some(1_700_000_000));
        assert_eq!(items[0].randomization_flag, Some(0));
        // Item timestamp wins over the root one.
        assert_eq!(items[1].timestamp, Some(1_700_000_005));
    }

    #[test]
    fn test_rssi_fallback_order() {
        let item = |v: Value| extract_item(&v, None).unwrap().rssi;
        assert_eq!(item(json!({"m":"a","r":-40,"s":-90})), -40);
        assert_eq!(item(json!({"m":"a","s":-90})), -90);
        assert_eq!(item(json!({"m":"a"})), 0);
        assert_eq!(item(json!({"m":"a","r":"-71"})), -71);
        assert_eq!(item(json!({"m":"a","r":-71.8})), -71);
        // "r" present but unusable does not fall through to "s".
        assert_eq!(item(json!({"m":"a","r":null,"s":-90})), 0);
    }

    #[test]
    fn test_missing_or_invalid_mac_dropped() {
        let message = WireMessage::from_value(json!([
            {"r": -50, "t": 1},
            {"m": "", "r": -50},
            {"m": 42, "r": -50},
            "not an object",
            {"m": "aa:bb:cc:dd:ee:ff"}
        ]))
        .unwrap();
        assert_eq!(message.item_count(), 5);
        let items = message.observations();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mac, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_non_positive_timestamps_are_absent() {
        let message = WireMessage::from_value(json!({"t": 0, "d": [
            {"m": "a"},
            {"m": "b", "t": -5},
            {"m": "c", "t": "1700000000"}
        ]}))
        .unwrap();
        let items = message.observations();
        assert_eq!(items[0].timestamp, None);
        assert_eq!(items[1].timestamp, None);
        assert_eq!(items[2].timestamp, Some(1_700_000_000));
    }

    #[test]
    fn test_object_without_items() {
        let message = WireMessage::from_value(json!({"t": 5, "d": "oops"})).unwrap();
        assert!(message.observations().is_empty());
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(WireMessage::decode(b"   "), Err(WireError::Empty)));
        assert!(matches!(WireMessage::decode(b"{not json"), Err(WireError::Syntax(_))));
        assert!(matches!(
            WireMessage::decode(b"42"),
            Err(WireError::UnexpectedRoot("number"))
        ));
        assert!(matches!(
            WireMessage::decode(br#""text""#),
            Err(WireError::UnexpectedRoot("string"))
        ));
        assert!(matches!(WireMessage::decode(&[0xff, 0xfe, 0x5b]), Err(_)));
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce_int(&json!(5)), Some(5));
        assert_eq!(coerce_int(&json!(5.9)), Some(5));
        assert_eq!(coerce_int(&json!(" 12 ")), Some(12));
        assert_eq!(coerce_int(&json!("3.5")), Some(3));
        assert_eq!(coerce_int(&json!(true)), Some(1));
        assert_eq!(coerce_int(&json!("abc")), None);
        assert_eq!(coerce_int(&json!(null)), None);
        assert_eq!(coerce_int(&json!([1])), None);
    }
}
