use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Serialize, Serializer};

use crate::utils::error::{ServiceError, ServiceResult};

/// Interned uppercase ticker.
///
/// Symbols are cheap to clone and compare; the canonical storage lives in
/// the service's `SymbolInterner`, so two `Symbol`s for the same ticker
/// share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Process-wide symbol intern table.
///
/// DashMap for lock-free reads on the hot path; entries are never removed
/// for the service lifetime.
pub struct SymbolInterner {
    symbols: DashMap<String, Symbol>,
}

const MAX_SYMBOL_LEN: usize = 16;

impl SymbolInterner {
    pub fn new() -> Self {
        Self { symbols: DashMap::new() }
    }

    /// Validate and intern a raw ticker string.
    ///
    /// Canonical form is uppercase ASCII, at most 16 characters, letters,
    /// digits, `.` and `-` only.
    pub fn intern(&self, raw: &str) -> ServiceResult<Symbol> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::invalid_argument("symbol cannot be empty"));
        }
        if trimmed.len() > MAX_SYMBOL_LEN {
            return Err(ServiceError::invalid_argument(format!(
                "symbol too long: '{}' (max {} chars)",
                trimmed, MAX_SYMBOL_LEN
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(ServiceError::invalid_argument(format!(
                "symbol contains invalid characters: '{}'",
                trimmed
            )));
        }

        let canonical = trimmed.to_ascii_uppercase();
        if let Some(existing) = self.symbols.get(&canonical) {
            return Ok(existing.clone());
        }
        let symbol = Symbol(Arc::from(canonical.as_str()));
        self.symbols.insert(canonical, symbol.clone());
        Ok(symbol)
    }

    /// Number of interned symbols (for status reporting)
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for SymbolInterner {
    fn default() -> Self {
        Self::new()
    }
}
