use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::catalog::{Catalog, DatasetKind, PartitionEntry};
use crate::models::{Bar, Granularity, OptionRow, Symbol};
use crate::store::normalizer::{normalize_bars, normalize_options, ScanStats};
use crate::store::PartitionStore;
use crate::utils::error::{ServiceError, ServiceResult};

/// The single storage capability the query layer depends on.
///
/// Implemented once over local partitions; the trait seam exists so the
/// planner and analyzers can be exercised against fixtures.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Partitions covering `(symbol, kind, granularity, [from, to])`
    fn resolve(
        &self,
        symbol: &Symbol,
        kind: DatasetKind,
        granularity: Option<Granularity>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<Vec<PartitionEntry>>;

    /// Scan one partition for bars; rows come back normalized and ordered
    async fn scan_bars(
        &self,
        entry: &PartitionEntry,
        symbol: &Symbol,
        from: NaiveDate,
        to: NaiveDate,
        granularity: Granularity,
        limit: usize,
    ) -> ServiceResult<(Vec<Bar>, ScanStats)>;

    /// Scan one partition for an option chain at `expiry`
    async fn scan_options(
        &self,
        entry: &PartitionEntry,
        symbol: &Symbol,
        expiry: NaiveDate,
    ) -> ServiceResult<(Vec<OptionRow>, ScanStats)>;
}

/// Partition-backed implementation: catalog for resolution, store for
/// scans, normalizer for canonicalization.
///
/// Structural failures (missing file, corrupt pages) quarantine the entry
/// and surface as `DATA_ERROR`; scan timeouts propagate unchanged.
pub struct PartitionProvider {
    catalog: Arc<Catalog>,
    store: Arc<PartitionStore>,
}

impl PartitionProvider {
    pub fn new(catalog: Arc<Catalog>, store: Arc<PartitionStore>) -> Self {
        Self { catalog, store }
    }

    fn absorb_structural(&self, entry: &PartitionEntry, err: ServiceError) -> ServiceError {
        match err {
            ServiceError::PartitionMissing(msg) | ServiceError::PartitionCorrupt(msg) => {
                self.catalog.quarantine(&entry.path, msg.clone());
                ServiceError::data_error(format!(
                    "partition {} is unreadable: {}",
                    entry.path.display(),
                    msg
                ))
            },
            other => other,
        }
    }
}

#[async_trait]
impl StorageProvider for PartitionProvider {
    fn resolve(
        &self,
        symbol: &Symbol,
        kind: DatasetKind,
        granularity: Option<Granularity>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<Vec<PartitionEntry>> {
        self.catalog.resolve(symbol, kind, granularity, from, to)
    }

    async fn scan_bars(
        &self,
        entry: &PartitionEntry,
        symbol: &Symbol,
        from: NaiveDate,
        to: NaiveDate,
        granularity: Granularity,
        limit: usize,
    ) -> ServiceResult<(Vec<Bar>, ScanStats)> {
        let pool = match self.store.open_read(entry).await {
            Ok(pool) => pool,
            Err(e) => return Err(self.absorb_structural(entry, e)),
        };
        let rows = match self.store.scan_bars(&pool, symbol, from, to, granularity, limit).await {
            Ok(rows) => rows,
            Err(e) => return Err(self.absorb_structural(entry, e)),
        };
        normalize_bars(rows, symbol, granularity)
    }

    async fn scan_options(
        &self,
        entry: &PartitionEntry,
        symbol: &Symbol,
        expiry: NaiveDate,
    ) -> ServiceResult<(Vec<OptionRow>, ScanStats)> {
        let pool = match self.store.open_read(entry).await {
            Ok(pool) => pool,
            Err(e) => return Err(self.absorb_structural(entry, e)),
        };
        let rows = match self.store.scan_options(&pool, symbol, expiry).await {
            Ok(rows) => rows,
            Err(e) => return Err(self.absorb_structural(entry, e)),
        };
        normalize_options(rows, symbol, expiry)
    }
}
