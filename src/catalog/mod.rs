//! Partition catalog: discovery, resolution and quarantine.
//!
//! The catalog is an immutable snapshot swapped atomically on refresh;
//! readers clone an `Arc` and never observe a half-built state.

pub mod entry;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

use crate::models::{Granularity, Symbol, SymbolInterner};
use crate::utils::error::{ServiceError, ServiceResult};

pub use entry::{DatasetKind, DateSpan, PartitionEntry};

/// Immutable result of one discovery pass
#[derive(Debug)]
pub struct CatalogSnapshot {
    pub root: PathBuf,
    pub entries: Vec<PartitionEntry>,
    /// Set when the data root is missing or unreadable; handlers translate
    /// this into `PROVIDER_UNAVAILABLE`.
    pub degraded: bool,
    pub discovered_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    fn empty(root: PathBuf, degraded: bool) -> Self {
        Self { root, entries: Vec::new(), degraded, discovered_at: Utc::now() }
    }
}

/// Aggregated view of one `(symbol, kind, granularity)` dataset
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub symbol: Symbol,
    pub kind: DatasetKind,
    pub granularity: Option<Granularity>,
    pub span: DateSpan,
    pub partitions: usize,
}

pub struct Catalog {
    root: PathBuf,
    interner: Arc<SymbolInterner>,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    /// Entries excluded from resolution after a structural read failure,
    /// keyed by partition path. Cleared on refresh.
    quarantined: DashMap<PathBuf, String>,
}

impl Catalog {
    /// Create a catalog over `root`. No filesystem access happens here;
    /// call `discover` (or `refresh`) to populate it.
    pub fn new(root: impl Into<PathBuf>, interner: Arc<SymbolInterner>) -> Self {
        let root = root.into();
        let initial = CatalogSnapshot::empty(root.clone(), true);
        Self {
            root,
            interner,
            snapshot: RwLock::new(Arc::new(initial)),
            quarantined: DashMap::new(),
        }
    }

    /// Scan the data root and swap in a fresh snapshot.
    ///
    /// Idempotent. A missing root produces an empty, degraded snapshot.
    /// Returns the number of catalogued partitions.
    pub fn discover(&self) -> usize {
        let snapshot = if self.root.is_dir() {
            let mut files = Vec::new();
            collect_files(&self.root, &mut files);
            files.sort();

            let mut entries = Vec::new();
            for path in files {
                if !entry::has_partition_extension(&path) {
                    continue;
                }
                match entry::parse_partition_name(&self.interner, &path) {
                    Some((symbol, kind, granularity, span)) => {
                        entries.push(PartitionEntry {
                            symbol,
                            kind,
                            granularity,
                            span,
                            path,
                            order: entries.len(),
                        });
                    },
                    None => {
                        tracing::warn!(
                            "Ignoring partition file with unrecognized name: {}",
                            path.display()
                        );
                    },
                }
            }
            CatalogSnapshot {
                root: self.root.clone(),
                entries,
                degraded: false,
                discovered_at: Utc::now(),
            }
        } else {
            tracing::warn!(
                "Data root {} does not exist; catalog is degraded",
                self.root.display()
            );
            CatalogSnapshot::empty(self.root.clone(), true)
        };

        let count = snapshot.entries.len();
        if !snapshot.degraded {
            tracing::info!("Catalog discovered {} partitions under {}", count, self.root.display());
        }
        let snapshot = Arc::new(snapshot);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        count
    }

    /// Re-discover and clear the quarantine list
    pub fn refresh(&self) -> usize {
        self.quarantined.clear();
        self.discover()
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.snapshot().degraded
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exclude a partition from resolution until the next refresh
    pub fn quarantine(&self, path: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Quarantining partition {}: {}", path.display(), reason);
        self.quarantined.insert(path.to_path_buf(), reason);
    }

    pub fn quarantined_count(&self) -> usize {
        self.quarantined.len()
    }

    /// Partitions of `kind`/`granularity` for `symbol` whose span intersects
    /// `[from, to]`, ordered by span start then discovery order.
    pub fn resolve(
        &self,
        symbol: &Symbol,
        kind: DatasetKind,
        granularity: Option<Granularity>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<Vec<PartitionEntry>> {
        let snapshot = self.snapshot();
        if snapshot.degraded {
            return Err(ServiceError::provider_unavailable(format!(
                "data root {} is unavailable",
                snapshot.root.display()
            )));
        }

        let mut matched: Vec<PartitionEntry> = snapshot
            .entries
            .iter()
            .filter(|e| {
                e.kind == kind
                    && e.symbol == *symbol
                    && e.granularity == granularity
                    && e.span.intersects(from, to)
                    && !self.quarantined.contains_key(&e.path)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.span.start.cmp(&b.span.start).then(a.order.cmp(&b.order)));
        Ok(matched)
    }

    /// Distinct datasets with their covered span and partition count,
    /// ordered by (symbol, kind, granularity).
    pub fn datasets(&self) -> Vec<DatasetSummary> {
        let snapshot = self.snapshot();
        let mut summaries: Vec<DatasetSummary> = Vec::new();
        for e in &snapshot.entries {
            match summaries.iter_mut().find(|s| {
                s.symbol == e.symbol && s.kind == e.kind && s.granularity == e.granularity
            }) {
                Some(s) => {
                    s.span.start = s.span.start.min(e.span.start);
                    s.span.end = s.span.end.max(e.span.end);
                    s.partitions += 1;
                },
                None => summaries.push(DatasetSummary {
                    symbol: e.symbol.clone(),
                    kind: e.kind,
                    granularity: e.granularity,
                    span: e.span,
                    partitions: 1,
                }),
            }
        }
        summaries.sort_by(|a, b| {
            a.symbol
                .cmp(&b.symbol)
                .then(a.kind.cmp(&b.kind))
                .then(a.granularity.cmp(&b.granularity))
        });
        summaries
    }

    /// Kinds present in the current snapshot, for health probing
    pub fn kinds(&self) -> Vec<DatasetKind> {
        let snapshot = self.snapshot();
        let mut kinds: Vec<DatasetKind> = snapshot.entries.iter().map(|e| e.kind).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot read directory {}: {}", dir.display(), e);
            return;
        },
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}
