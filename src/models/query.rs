use chrono::{Datelike, Duration, NaiveDate, Utc};

use crate::models::{Granularity, Symbol, SymbolInterner};
use crate::utils::error::{ServiceError, ServiceResult};
use crate::utils::time::parse_iso_date;

/// A validated bar query.
///
/// Construction is the validation boundary: a `BarsQuery` that exists is
/// well-formed (ordered range, in-bounds dates, canonical symbol and
/// granularity).
#[derive(Debug, Clone, PartialEq)]
pub struct BarsQuery {
    pub symbol: Symbol,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub granularity: Granularity,
}

impl BarsQuery {
    pub fn parse(
        interner: &SymbolInterner,
        symbol: &str,
        from: &str,
        to: &str,
        granularity: Option<&str>,
    ) -> ServiceResult<Self> {
        let symbol = interner.intern(symbol)?;
        let from = parse_iso_date("from", from)?;
        let to = parse_iso_date("to", to)?;
        let granularity = match granularity {
            Some(raw) => raw.parse()?,
            None => Granularity::OneDay,
        };

        if from > to {
            return Err(ServiceError::invalid_argument(format!(
                "from ({}) must not be after to ({})",
                from, to
            )));
        }
        if from.year() < 1970 {
            return Err(ServiceError::invalid_argument(format!(
                "from ({}) must not precede 1970-01-01",
                from
            )));
        }
        let ceiling = Utc::now().date_naive() + Duration::days(1);
        if to > ceiling {
            return Err(ServiceError::invalid_argument(format!(
                "to ({}) must not be later than tomorrow ({})",
                to, ceiling
            )));
        }

        Ok(Self { symbol, from, to, granularity })
    }

    /// Canonical cache-key fragment for this query
    pub fn fingerprint(&self) -> String {
        format!("{}|{}|{}|{}", self.symbol, self.from, self.to, self.granularity)
    }
}

/// Build the full response-cache key for a tool call.
///
/// Arguments must already be in canonical form; the fingerprint is a plain
/// `|`-joined concatenation so equal queries always collide.
pub fn fingerprint(tool: &str, canonical_args: &str) -> String {
    format!("{}|{}", tool, canonical_args)
}
