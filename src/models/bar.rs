use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::models::{Granularity, Symbol};

/// Fixed-point price with four decimal places.
///
/// Stored as the scaled integer value, so invariant comparisons are exact
/// and no float drift accumulates through the merge path. Serializes as a
/// plain JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Price(i64);

impl Price {
    pub const SCALE: i64 = 10_000;

    /// Convert from a raw float, rounding to four decimal places.
    /// Returns None for NaN, infinities and values outside the i64 range.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = value * Self::SCALE as f64;
        if scaled <= i64::MIN as f64 || scaled >= i64::MAX as f64 {
            return None;
        }
        Some(Price(scaled.round() as i64))
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

/// Canonical OHLCV record.
///
/// Field names stay long-form here; the packager maps them to the short
/// wire names (`t,o,h,l,c,v,symbol,g`) at serialization time.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: Symbol,
    pub t: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: i64,
    pub granularity: Granularity,
}

impl Bar {
    /// Bar integrity invariant: `l ≤ min(o,c) ≤ max(o,c) ≤ h` and `v ≥ 0`.
    pub fn is_valid(&self) -> bool {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        self.low <= body_low && body_high <= self.high && self.volume >= 0
    }
}
