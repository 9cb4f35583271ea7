//! Named query timeframes and their resolution table.
//!
//! Every time-based view resolves its duration and bucket width from the
//! single table below:
//!
//! | label | duration | snapshot bucket | presence bucket |
//! |-------|----------|-----------------|-----------------|
//! | 1h    | 3600     | raw             | 600             |
//! | 6h    | 21600    | raw             | 900             |
//! | 12h   | 43200    | raw             | 1800            |
//! | 1d    | 86400    | raw             | 3600            |
//! | 30d   | 2592000  | 86400 (max)     | 86400           |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;

/// Query timeframe. Defaults to one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl Timeframe {
    pub fn all() -> [Timeframe; 5] {
        [
            Timeframe::OneHour,
            Timeframe::SixHours,
            Timeframe::TwelveHours,
            Timeframe::OneDay,
            Timeframe::ThirtyDays,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::SixHours => "6h",
            Timeframe::TwelveHours => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::ThirtyDays => "30d",
        }
    }

    /// Window length in seconds.
    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::OneHour => HOUR,
            Timeframe::SixHours => 6 * HOUR,
            Timeframe::TwelveHours => 12 * HOUR,
            Timeframe::OneDay => DAY,
            Timeframe::ThirtyDays => 30 * DAY,
        }
    }

    /// Bucket width of the snapshot series. Zero means one point per
    /// snapshot; otherwise buckets report their maximum.
    pub fn snapshot_bucket_secs(&self) -> i64 {
        match self {
            Timeframe::ThirtyDays => DAY,
            _ => 0,
        }
    }

    /// Bucket width of the forward-filled presence series.
    pub fn presence_bucket_secs(&self) -> i64 {
        match self {
            Timeframe::OneHour => 600,
            Timeframe::SixHours => 900,
            Timeframe::TwelveHours => 1_800,
            Timeframe::OneDay => HOUR,
            Timeframe::ThirtyDays => DAY,
        }
    }

    /// Parse a label, falling back to one hour for anything unknown.
    pub fn parse_or_default(label: Option<&str>) -> Self {
        label
            .and_then(|l| l.parse().ok())
            .unwrap_or_default()
    }

    /// Parse the older numeric form, where the value is a window in minutes.
    pub fn from_legacy(value: &str) -> Self {
        match value.trim().parse::<i64>() {
            Ok(60) => Timeframe::OneHour,
            Ok(360) => Timeframe::SixHours,
            Ok(720) => Timeframe::TwelveHours,
            Ok(_) => Timeframe::OneHour,
            Err(_) => Self::parse_or_default(Some(value)),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Timeframe::all()
            .into_iter()
            .find(|t| t.label() == wanted)
            .ok_or_else(|| format!("unknown timeframe '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for timeframe in Timeframe::all() {
            assert_eq!(timeframe.label().parse::<Timeframe>(), Ok(timeframe));
        }
        assert_eq!("1D".parse::<Timeframe>(), Ok(Timeframe::OneDay));
    }

    #[test]
    fn test_unknown_defaults_to_one_hour() {
        assert_eq!(Timeframe::parse_or_default(Some("2w")), Timeframe::OneHour);
        assert_eq!(Timeframe::parse_or_default(None), Timeframe::OneHour);
        assert_eq!(Timeframe::parse_or_default(Some("12h")), Timeframe::TwelveHours);
    }

    #[test]
    fn test_legacy_minutes() {
        assert_eq!(Timeframe::from_legacy("60"), Timeframe::OneHour);
        assert_eq!(Timeframe::from_legacy("360"), Timeframe::SixHours);
        assert_eq!(Timeframe::from_legacy("720"), Timeframe::TwelveHours);
        assert_eq!(Timeframe::from_legacy("15"), Timeframe::OneHour);
        assert_eq!(Timeframe::from_legacy("30d"), Timeframe::ThirtyDays);
    }

    #[test]
    fn test_resolution_table() {
        assert_eq!(Timeframe::OneHour.duration_secs(), 3_600);
        assert_eq!(Timeframe::ThirtyDays.duration_secs(), 2_592_000);
        for timeframe in [
            Timeframe::OneHour,
            Timeframe::SixHours,
            Timeframe::TwelveHours,
            Timeframe::OneDay,
        ] {
            assert_eq!(timeframe.snapshot_bucket_secs(), 0);
        }
        assert_eq!(Timeframe::ThirtyDays.snapshot_bucket_secs(), 86_400);
        assert_eq!(Timeframe::OneHour.presence_bucket_secs(), 600);
        assert_eq!(Timeframe::OneDay.presence_bucket_secs(), 3_600);
    }

    #[test]
    fn test_serde_uses_labels() {
        assert_eq!(serde_json::to_string(&Timeframe::SixHours).unwrap(), "\"6h\"");
    }
}
