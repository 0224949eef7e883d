use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::models::{Price, Symbol};
use crate::utils::error::ServiceError;

/// Option right: call or put
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionRight::Call => "CALL",
            OptionRight::Put => "PUT",
        }
    }
}

impl FromStr for OptionRight {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" | "C" => Ok(OptionRight::Call),
            "PUT" | "P" => Ok(OptionRight::Put),
            other => Err(ServiceError::data_error(format!("unknown option right: '{}'", other))),
        }
    }
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OptionRight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Canonical option-chain row
#[derive(Debug, Clone, PartialEq)]
pub struct OptionRow {
    pub symbol: Symbol,
    pub expiry: NaiveDate,
    pub right: OptionRight,
    pub strike: Price,
    pub bid: Option<Price>,
    pub ask: Option<Price>,
    pub mid: Option<Price>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
}

impl OptionRow {
    /// Chain-row invariant: positive strike, and `bid ≤ ask` whenever both
    /// sides are quoted.
    pub fn is_valid(&self) -> bool {
        if !self.strike.is_positive() {
            return false;
        }
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => bid <= ask,
            _ => true,
        }
    }
}
