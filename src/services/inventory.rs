//! Coverage analysis for the `data_inventory` tool.
//!
//! Samples up to 50 likely-trading days uniformly across a range, probes
//! the daily bar store for each, and folds the hit rate into a coverage
//! percentage with one recommendation from a fixed ladder.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::catalog::DatasetKind;
use crate::models::{Granularity, Symbol};
use crate::store::StorageProvider;
use crate::utils::error::ServiceResult;
use crate::utils::time::{estimate_trading_days, is_weekday};

const MAX_PROBES: usize = 50;
const MAX_LISTED_SAMPLES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub priority: String,
    pub action: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryReport {
    pub symbol: String,
    pub granularity: Granularity,
    pub from: String,
    pub to: String,
    pub probed: usize,
    pub found: usize,
    pub coverage_pct: f64,
    pub expected_trading_days: i64,
    pub available_samples: Vec<String>,
    pub missing_samples: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

pub struct InventoryAnalyzer {
    provider: Arc<dyn StorageProvider>,
}

impl InventoryAnalyzer {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    pub async fn analyze(
        &self,
        symbol: &Symbol,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<InventoryReport> {
        let samples = sample_dates(from, to);
        let mut available = Vec::new();
        let mut missing = Vec::new();

        for date in &samples {
            if self.probe(symbol, *date).await? {
                available.push(date.to_string());
            } else {
                missing.push(date.to_string());
            }
        }

        let probed = samples.len();
        let found = available.len();
        let coverage_pct = if probed == 0 { 0.0 } else { found as f64 / probed as f64 * 100.0 };

        available.truncate(MAX_LISTED_SAMPLES);
        missing.truncate(MAX_LISTED_SAMPLES);

        let report = InventoryReport {
            symbol: symbol.to_string(),
            granularity: Granularity::OneDay,
            from: from.to_string(),
            to: to.to_string(),
            probed,
            found,
            coverage_pct,
            expected_trading_days: estimate_trading_days(from, to),
            available_samples: available,
            missing_samples: missing,
            recommendations: vec![recommend(coverage_pct, symbol)],
        };
        tracing::debug!(
            "Inventory for {} [{} .. {}]: {:.1}% coverage over {} probes",
            symbol,
            from,
            to,
            coverage_pct,
            probed
        );
        Ok(report)
    }

    /// One daily-bar probe; resolution misses and unreadable partitions
    /// both count as a missing sample.
    async fn probe(&self, symbol: &Symbol, date: NaiveDate) -> ServiceResult<bool> {
        let entries = self.provider.resolve(
            symbol,
            DatasetKind::Bars,
            Some(Granularity::OneDay),
            date,
            date,
        )?;
        for entry in &entries {
            match self
                .provider
                .scan_bars(entry, symbol, date, date, Granularity::OneDay, 1)
                .await
            {
                Ok((bars, _)) if !bars.is_empty() => return Ok(true),
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("Inventory probe failed for {} at {}: {}", symbol, date, e);
                    continue;
                },
            }
        }
        Ok(false)
    }
}

/// Up to 50 weekday samples spread uniformly over `[from, to]`
fn sample_dates(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    if to < from {
        return Vec::new();
    }
    let total_days = (to - from).num_days() + 1;
    let step = Duration::days((total_days / MAX_PROBES as i64).max(1));

    let mut samples = Vec::new();
    let mut d = from;
    while d <= to && samples.len() < MAX_PROBES {
        let mut candidate = d;
        // Skip weekend landings forward to the next weekday still in range
        while candidate <= to && !is_weekday(candidate) {
            candidate += Duration::days(1);
        }
        if candidate <= to && samples.last() != Some(&candidate) {
            samples.push(candidate);
        }
        d += step;
    }
    samples
}

/// Mutually exclusive recommendation ladder
fn recommend(coverage_pct: f64, symbol: &Symbol) -> Recommendation {
    if coverage_pct < 10.0 {
        Recommendation {
            priority: "HIGH".to_string(),
            action: "ACQUIRE_DATA".to_string(),
            detail: format!("less than 10% coverage for {}; acquire historical data", symbol),
        }
    } else if coverage_pct < 70.0 {
        Recommendation {
            priority: "MEDIUM".to_string(),
            action: "FILL_GAPS".to_string(),
            detail: format!("partial coverage for {}; backfill the missing ranges", symbol),
        }
    } else if coverage_pct < 95.0 {
        Recommendation {
            priority: "LOW".to_string(),
            action: "OPTIMIZE_COVERAGE".to_string(),
            detail: format!("near-complete coverage for {}; fill the remaining gaps", symbol),
        }
    } else {
        Recommendation {
            priority: "INFO".to_string(),
            action: "DATA_READY".to_string(),
            detail: format!("coverage for {} is complete", symbol),
        }
    }
}
