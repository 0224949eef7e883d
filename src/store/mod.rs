//! Read-only partition access.
//!
//! One bounded `SqlitePool` per partition file, created lazily on first
//! open and held for the process lifetime. Writers are assumed absent while
//! the service runs; connections are opened read-only with shared cache and
//! tolerate WAL journals left behind by the ingest tooling.

pub mod normalizer;
pub mod provider;

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::catalog::PartitionEntry;
use crate::models::{Granularity, Symbol};
use crate::utils::error::{ServiceError, ServiceResult};

pub use normalizer::ScanStats;
pub use provider::{PartitionProvider, StorageProvider};

/// Bar row exactly as stored in a partition file, before normalization
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawBarRow {
    pub symbol: String,
    pub t: String,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: i64,
    pub g: String,
}

/// Option-chain row as stored in a partition file
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawOptionRow {
    pub symbol: String,
    pub expiry: String,
    pub right: String,
    pub strike: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub mid: Option<f64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
}

const SCAN_BARS_SQL: &str = "SELECT symbol, t, o, h, l, c, v, g FROM bars \
     WHERE symbol = ? AND g = ? AND t >= ? AND t < ? \
     ORDER BY t ASC LIMIT ?";

const SCAN_OPTIONS_SQL: &str =
    "SELECT symbol, expiry, \"right\", strike, bid, ask, mid, delta, gamma FROM options \
     WHERE symbol = ? AND expiry = ? \
     ORDER BY \"right\" ASC, strike ASC";

pub struct PartitionStore {
    pools: DashMap<PathBuf, SqlitePool>,
    scan_timeout: Duration,
    /// Total connection budget across all partitions (2 × cores by default);
    /// divided among open pools as they are created.
    pool_budget: u32,
}

impl PartitionStore {
    pub fn new(scan_timeout: Duration, pool_budget: u32) -> Self {
        Self { pools: DashMap::new(), scan_timeout, pool_budget: pool_budget.max(2) }
    }

    /// Get or open the read-only pool for a partition.
    ///
    /// Fast path: pooled handle returned without touching the filesystem.
    pub async fn open_read(&self, entry: &PartitionEntry) -> ServiceResult<SqlitePool> {
        if let Some(pool) = self.pools.get(&entry.path) {
            return Ok(pool.value().clone());
        }

        if !entry.path.is_file() {
            return Err(ServiceError::partition_missing(format!(
                "partition {} disappeared after discovery",
                entry.path.display()
            )));
        }

        let per_pool = (self.pool_budget / (self.pools.len() as u32 + 1)).max(2);
        let options = SqliteConnectOptions::new()
            .filename(&entry.path)
            .read_only(true)
            .shared_cache(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(per_pool)
            .acquire_timeout(self.scan_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                ServiceError::partition_corrupt(format!(
                    "cannot open partition {}: {}",
                    entry.path.display(),
                    e
                ))
            })?;

        self.pools.insert(entry.path.clone(), pool.clone());
        tracing::debug!(
            "Opened partition {} (pool size {})",
            entry.path.display(),
            per_pool
        );
        Ok(pool)
    }

    /// Range scan over bars in `t` ascending order.
    ///
    /// Bounds are inclusive of `from` and `to` at date precision; `limit`
    /// caps the rows fetched (callers pass their remaining row budget).
    pub async fn scan_bars(
        &self,
        pool: &SqlitePool,
        symbol: &Symbol,
        from: NaiveDate,
        to: NaiveDate,
        granularity: Granularity,
        limit: usize,
    ) -> ServiceResult<Vec<RawBarRow>> {
        // Bare-date bounds compare lexicographically below any timestamp on
        // the same day, so [from, to] maps to t >= from AND t < to+1day.
        let lower = from.to_string();
        let upper = match to.succ_opt() {
            Some(next) => next.to_string(),
            None => return Err(ServiceError::invalid_argument("date range overflows calendar")),
        };

        let query = sqlx::query_as::<_, RawBarRow>(SCAN_BARS_SQL)
            .bind(symbol.as_str())
            .bind(granularity.as_str())
            .bind(lower)
            .bind(upper)
            .bind(limit as i64)
            .fetch_all(pool);

        match tokio::time::timeout(self.scan_timeout, query).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(map_scan_error(e)),
            Err(_) => Err(ServiceError::scan_timeout(format!(
                "bar scan exceeded {} ms budget",
                self.scan_timeout.as_millis()
            ))),
        }
    }

    /// Option-chain scan ordered by `(right, strike)`
    pub async fn scan_options(
        &self,
        pool: &SqlitePool,
        symbol: &Symbol,
        expiry: NaiveDate,
    ) -> ServiceResult<Vec<RawOptionRow>> {
        let query = sqlx::query_as::<_, RawOptionRow>(SCAN_OPTIONS_SQL)
            .bind(symbol.as_str())
            .bind(expiry.to_string())
            .fetch_all(pool);

        match tokio::time::timeout(self.scan_timeout, query).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(map_scan_error(e)),
            Err(_) => Err(ServiceError::scan_timeout(format!(
                "option scan exceeded {} ms budget",
                self.scan_timeout.as_millis()
            ))),
        }
    }

    /// Number of partitions with an open pool (for status reporting)
    pub fn open_partitions(&self) -> usize {
        self.pools.len()
    }
}

fn map_scan_error(err: sqlx::Error) -> ServiceError {
    match err {
        sqlx::Error::PoolTimedOut => {
            ServiceError::scan_timeout("connection checkout timed out".to_string())
        },
        other => ServiceError::partition_corrupt(format!("scan failed: {}", other)),
    }
}
