use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::utils::error::ServiceError;

/// Bar cadence identifier.
///
/// Canonical string forms are `1m`, `5m`, `1h`, `1d`; the parser also
/// accepts the aliases `1min`, `5min`, `day` and `d` case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    OneMinute,
    FiveMinute,
    OneHour,
    OneDay,
}

/// Partition span targeted by a granularity when files are laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanClass {
    /// One calendar year per file (1m bars)
    Yearly,
    /// Five calendar years per file (5m, 1h, 1d bars)
    FiveYear,
    /// One calendar month per file (sub-minute tick data)
    Monthly,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::OneMinute,
        Granularity::FiveMinute,
        Granularity::OneHour,
        Granularity::OneDay,
    ];

    /// Canonical string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinute => "5m",
            Granularity::OneHour => "1h",
            Granularity::OneDay => "1d",
        }
    }

    /// Expected bar cadence in seconds
    pub fn cadence_secs(&self) -> i64 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinute => 300,
            Granularity::OneHour => 3_600,
            Granularity::OneDay => 86_400,
        }
    }

    /// Partition span class this granularity is stored under
    pub fn span_class(&self) -> SpanClass {
        match self {
            Granularity::OneMinute => SpanClass::Yearly,
            Granularity::FiveMinute | Granularity::OneHour | Granularity::OneDay => {
                SpanClass::FiveYear
            },
        }
    }
}

impl FromStr for Granularity {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" | "1min" => Ok(Granularity::OneMinute),
            "5m" | "5min" => Ok(Granularity::FiveMinute),
            "1h" => Ok(Granularity::OneHour),
            "1d" | "day" | "d" => Ok(Granularity::OneDay),
            other => Err(ServiceError::invalid_argument(format!(
                "unknown granularity: '{}' (expected one of 1m, 5m, 1h, 1d)",
                other
            ))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Granularity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Granularity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
