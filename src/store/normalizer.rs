//! Raw-row normalization.
//!
//! Rows coming off a partition scan are untrusted: timestamps may carry
//! offsets, prices may be garbage, uniqueness may have been violated by a
//! bad ingest. Normalization converts each row into a canonical record,
//! drops rows that fail the integrity invariants, and fails the whole scan
//! when more than half of it had to be dropped.

use chrono::NaiveDate;

use crate::models::{Bar, Granularity, OptionRight, OptionRow, Price, Symbol};
use crate::store::{RawBarRow, RawOptionRow};
use crate::utils::error::{ServiceError, ServiceResult};
use crate::utils::time::parse_row_timestamp;

/// Per-scan accounting of dropped rows
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStats {
    pub total: usize,
    pub dropped: usize,
}

impl ScanStats {
    fn check(&self, context: &str) -> ServiceResult<()> {
        if self.total > 0 && self.dropped * 2 > self.total {
            return Err(ServiceError::data_error(format!(
                "{}: {} of {} rows failed integrity checks",
                context, self.dropped, self.total
            )));
        }
        Ok(())
    }
}

/// Normalize a sorted bar scan.
///
/// The symbol and granularity on each record are overwritten with the
/// canonical interned values; rows with unparseable timestamps, broken
/// OHLC ordering, negative volume, or a non-increasing `t` are dropped.
pub fn normalize_bars(
    rows: Vec<RawBarRow>,
    symbol: &Symbol,
    granularity: Granularity,
) -> ServiceResult<(Vec<Bar>, ScanStats)> {
    let mut stats = ScanStats { total: rows.len(), dropped: 0 };
    let mut bars: Vec<Bar> = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(t) = parse_row_timestamp(&row.t) else {
            stats.dropped += 1;
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            Price::from_f64(row.o),
            Price::from_f64(row.h),
            Price::from_f64(row.l),
            Price::from_f64(row.c),
        ) else {
            stats.dropped += 1;
            continue;
        };

        let bar = Bar {
            symbol: symbol.clone(),
            t,
            open,
            high,
            low,
            close,
            volume: row.v,
            granularity,
        };
        if !bar.is_valid() {
            stats.dropped += 1;
            continue;
        }
        // Timestamps must be strictly increasing within one partition;
        // storage order wins, the later duplicate is dropped.
        if let Some(last) = bars.last() {
            if bar.t <= last.t {
                stats.dropped += 1;
                continue;
            }
        }
        bars.push(bar);
    }

    if stats.dropped > 0 {
        tracing::debug!(
            "Dropped {}/{} bar rows for {} during normalization",
            stats.dropped,
            stats.total,
            symbol
        );
    }
    stats.check("bar scan")?;
    Ok((bars, stats))
}

/// Normalize an option-chain scan sorted by `(right, strike)`
pub fn normalize_options(
    rows: Vec<RawOptionRow>,
    symbol: &Symbol,
    expiry: NaiveDate,
) -> ServiceResult<(Vec<OptionRow>, ScanStats)> {
    let mut stats = ScanStats { total: rows.len(), dropped: 0 };
    let mut chain: Vec<OptionRow> = Vec::with_capacity(rows.len());

    for row in rows {
        let Ok(right) = row.right.parse::<OptionRight>() else {
            stats.dropped += 1;
            continue;
        };
        let Some(strike) = Price::from_f64(row.strike) else {
            stats.dropped += 1;
            continue;
        };

        let record = OptionRow {
            symbol: symbol.clone(),
            expiry,
            right,
            strike,
            bid: row.bid.and_then(Price::from_f64),
            ask: row.ask.and_then(Price::from_f64),
            mid: row.mid.and_then(Price::from_f64),
            delta: row.delta,
            gamma: row.gamma,
        };
        if !record.is_valid() {
            stats.dropped += 1;
            continue;
        }
        // Unique on (symbol, expiry, right, strike); keep the first copy
        if let Some(last) = chain.last() {
            if (last.right, last.strike) == (record.right, record.strike) {
                stats.dropped += 1;
                continue;
            }
        }
        chain.push(record);
    }

    stats.check("option scan")?;
    Ok((chain, stats))
}
