//! Read-path query planning.
//!
//! A plan is the ordered set of partitions whose span intersects the query
//! range. Scans run in span order and are stitched into one stream with a
//! k-way merge on `t`; partitions for the same `(symbol, g)` should not
//! overlap, but when a bad ingest makes them overlap the copy from the
//! partition with the later span start wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::catalog::DatasetKind;
use crate::models::{Bar, BarsQuery, OptionRow, Symbol};
use crate::store::StorageProvider;
use crate::utils::error::{ServiceError, ServiceResult};

pub struct QueryPlanner {
    provider: Arc<dyn StorageProvider>,
    max_rows: usize,
    /// Total planner entries; exposed so tests can observe singleflight
    invocations: AtomicU64,
    /// Duplicate rows observed across overlapping partitions
    overlap_conflicts: AtomicU64,
}

impl QueryPlanner {
    pub fn new(provider: Arc<dyn StorageProvider>, max_rows: usize) -> Self {
        Self {
            provider,
            max_rows,
            invocations: AtomicU64::new(0),
            overlap_conflicts: AtomicU64::new(0),
        }
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn overlap_conflicts(&self) -> u64 {
        self.overlap_conflicts.load(Ordering::Relaxed)
    }

    /// Execute a bar query across all covering partitions.
    ///
    /// Returns `NOT_FOUND` when no partition covers the range at all; an
    /// empty vec when partitions exist but hold no rows in range.
    pub async fn bars(&self, query: &BarsQuery) -> ServiceResult<Vec<Bar>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let entries = self.provider.resolve(
            &query.symbol,
            DatasetKind::Bars,
            Some(query.granularity),
            query.from,
            query.to,
        )?;
        if entries.is_empty() {
            return Err(ServiceError::not_found(format!(
                "no {} partitions cover {} [{} .. {}]",
                query.granularity, query.symbol, query.from, query.to
            )));
        }

        let scan_limit = self.max_rows + 1;
        let mut streams: Vec<(NaiveDate, Vec<Bar>)> = Vec::with_capacity(entries.len());
        for entry in &entries {
            let (bars, _stats) = self
                .provider
                .scan_bars(
                    entry,
                    &query.symbol,
                    query.from,
                    query.to,
                    query.granularity,
                    scan_limit,
                )
                .await?;
            if bars.len() > self.max_rows {
                return Err(self.too_large(query));
            }
            streams.push((entry.span.start, bars));
        }

        let merged = self.merge_bar_streams(streams)?;
        if merged.len() > self.max_rows {
            return Err(self.too_large(query));
        }
        Ok(merged)
    }

    fn too_large(&self, query: &BarsQuery) -> ServiceError {
        ServiceError::query_too_large(format!(
            "query {} [{} .. {}] at {} exceeds the {} row cap; narrow the range",
            query.symbol, query.from, query.to, query.granularity, self.max_rows
        ))
    }

    /// Merge per-partition streams (each sorted by `t`) into one stream in
    /// strict `t` order. On duplicate timestamps across partitions the bar
    /// from the later span start survives.
    fn merge_bar_streams(&self, streams: Vec<(NaiveDate, Vec<Bar>)>) -> ServiceResult<Vec<Bar>> {
        let mut cursors: Vec<(NaiveDate, std::vec::IntoIter<Bar>, Option<Bar>)> = streams
            .into_iter()
            .map(|(span_start, bars)| {
                let mut iter = bars.into_iter();
                let head = iter.next();
                (span_start, iter, head)
            })
            .collect();

        let mut out: Vec<Bar> = Vec::new();
        loop {
            let min_t = match cursors
                .iter()
                .filter_map(|(_, _, head)| head.as_ref().map(|b| b.t))
                .min()
            {
                Some(t) => t,
                None => break,
            };

            // All cursors currently at min_t; the latest span start wins.
            let mut winner: Option<(NaiveDate, Bar)> = None;
            let mut duplicates = 0u64;
            for (span_start, iter, head) in cursors.iter_mut() {
                if head.as_ref().map(|b| b.t) != Some(min_t) {
                    continue;
                }
                let bar = match head.take() {
                    Some(bar) => bar,
                    None => continue,
                };
                *head = iter.next();
                match &winner {
                    Some((best_start, _)) => {
                        duplicates += 1;
                        if *span_start > *best_start {
                            winner = Some((*span_start, bar));
                        }
                    },
                    None => winner = Some((*span_start, bar)),
                }
            }
            if duplicates > 0 {
                self.overlap_conflicts.fetch_add(duplicates, Ordering::Relaxed);
            }
            if let Some((_, bar)) = winner {
                out.push(bar);
            }
            if out.len() > self.max_rows {
                return Ok(out);
            }
        }
        Ok(out)
    }

    /// Fetch the stored option chain for `(symbol, expiry)`.
    ///
    /// No covering partition is `NOT_FOUND`; a covered expiry with no rows
    /// is an empty chain.
    pub async fn options(
        &self,
        symbol: &Symbol,
        expiry: NaiveDate,
    ) -> ServiceResult<Vec<OptionRow>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let entries =
            self.provider.resolve(symbol, DatasetKind::Options, None, expiry, expiry)?;
        if entries.is_empty() {
            return Err(ServiceError::not_found(format!(
                "no option partitions cover {} at {}",
                symbol, expiry
            )));
        }

        // Entries arrive ordered by span start; later entries overwrite
        // duplicates so the newer copy wins.
        let mut chain: std::collections::BTreeMap<_, OptionRow> = std::collections::BTreeMap::new();
        for entry in &entries {
            let (rows, _stats) = self.provider.scan_options(entry, symbol, expiry).await?;
            for row in rows {
                let key = (row.right, row.strike);
                if chain.insert(key, row).is_some() {
                    self.overlap_conflicts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(chain.into_values().collect())
    }
}
