use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Granularity, Symbol, SymbolInterner};

/// What a partition file stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetKind {
    Bars,
    Options,
    /// Sub-minute tick captures (`trades_…`/`quotes_…` monthly files).
    /// Catalogued and reported, but not addressable through the bar tools.
    Ticks,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Bars => "bars",
            DatasetKind::Options => "options",
            DatasetKind::Ticks => "ticks",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date range covered by a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn year(y: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(y, 1, 1)?,
            end: NaiveDate::from_ymd_opt(y, 12, 31)?,
        })
    }

    pub fn years(y1: i32, y2: i32) -> Option<Self> {
        if y2 < y1 {
            return None;
        }
        Some(Self {
            start: NaiveDate::from_ymd_opt(y1, 1, 1)?,
            end: NaiveDate::from_ymd_opt(y2, 12, 31)?,
        })
    }

    pub fn month(y: i32, m: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(y, m, 1)?;
        let end = if m == 12 {
            NaiveDate::from_ymd_opt(y, 12, 31)?
        } else {
            NaiveDate::from_ymd_opt(y, m + 1, 1)?.pred_opt()?
        };
        Some(Self { start, end })
    }

    /// Inclusive-on-both-ends overlap test against `[from, to]`
    pub fn intersects(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start <= to && from <= self.end
    }
}

/// One discovered partition file
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionEntry {
    pub symbol: Symbol,
    pub kind: DatasetKind,
    /// Set for bar partitions; `None` for options and ticks
    pub granularity: Option<Granularity>,
    pub span: DateSpan,
    pub path: PathBuf,
    /// Stable discovery order, used as the resolve tie-break
    pub order: usize,
}

// Filename grammar (§ persisted state layout). Matched against the
// lowercased file stem; extensions .db/.sqlite/.sqlite3, case-insensitive.
static BARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9.\-]+)_(1m|1min|5m|5min|1h|1d|day)_(\d{4})(?:_(\d{4}))?$").unwrap()
});
static OPTIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^options_([a-z0-9.\-]+)_(\d{4})(?:_(\d{2}))?$").unwrap());
static TICKS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(trades|quotes|ticks)_([a-z0-9.\-]+)_(\d{4})_(\d{2})$").unwrap());

pub fn has_partition_extension(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("db") | Some("sqlite") | Some("sqlite3")
    )
}

/// Parse a partition filename against the naming grammar.
///
/// Returns None for any shape the grammar does not describe; the caller
/// decides whether that is worth a warning.
pub fn parse_partition_name(
    interner: &SymbolInterner,
    path: &Path,
) -> Option<(Symbol, DatasetKind, Option<Granularity>, DateSpan)> {
    let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();

    if let Some(caps) = OPTIONS_RE.captures(&stem) {
        let symbol = interner.intern(caps.get(1)?.as_str()).ok()?;
        let year: i32 = caps.get(2)?.as_str().parse().ok()?;
        let span = match caps.get(3) {
            Some(m) => DateSpan::month(year, m.as_str().parse().ok()?)?,
            None => DateSpan::year(year)?,
        };
        return Some((symbol, DatasetKind::Options, None, span));
    }

    if let Some(caps) = TICKS_RE.captures(&stem) {
        let symbol = interner.intern(caps.get(2)?.as_str()).ok()?;
        let year: i32 = caps.get(3)?.as_str().parse().ok()?;
        let month: u32 = caps.get(4)?.as_str().parse().ok()?;
        let span = DateSpan::month(year, month)?;
        return Some((symbol, DatasetKind::Ticks, None, span));
    }

    if let Some(caps) = BARS_RE.captures(&stem) {
        let symbol = interner.intern(caps.get(1)?.as_str()).ok()?;
        let granularity: Granularity = caps.get(2)?.as_str().parse().ok()?;
        let y1: i32 = caps.get(3)?.as_str().parse().ok()?;
        let span = match caps.get(4) {
            Some(y2) => DateSpan::years(y1, y2.as_str().parse().ok()?)?,
            None => DateSpan::year(y1)?,
        };
        return Some((symbol, DatasetKind::Bars, Some(granularity), span));
    }

    None
}
