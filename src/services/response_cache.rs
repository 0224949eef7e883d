//! Fingerprint-keyed response cache with singleflight misses.
//!
//! Values are fully serialized response payloads; a hit clones the payload
//! and counts as a use, so eviction is LRU: when the cache is full, the
//! entry that has gone longest without being read or written is dropped
//! first. Misses for the same key coalesce onto a single computation via a
//! per-key async lock; failed computations are never cached.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::utils::error::ServiceResult;

#[derive(Debug, Clone)]
struct CachedResponse {
    payload: String,
    inserted_at: Instant,
    /// None = never expires (pre-seeded static payloads)
    expires_at: Option<Instant>,
}

pub struct ResponseCache {
    entries: DashMap<String, CachedResponse>,
    /// Evictable keys from least- to most-recently used; reads and writes
    /// both move a key to the back. Seeds are not listed and so are never
    /// evicted.
    order: Mutex<VecDeque<String>>,
    inflight: DashMap<String, std::sync::Arc<tokio::sync::Mutex<()>>>,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            inflight: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Look up a live entry, expiring it if its TTL has lapsed.
    ///
    /// A hit promotes the key to most-recently used.
    pub fn get(&self, key: &str) -> Option<String> {
        let expired = {
            let entry = self.entries.get(key)?;
            match entry.expires_at {
                Some(deadline) => Instant::now() >= deadline,
                None => false,
            }
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        let payload = self.entries.get(key).map(|e| e.payload.clone());
        if payload.is_some() {
            self.promote(key);
        }
        payload
    }

    /// Insert a TTL-bounded entry, evicting least-recently-used entries to
    /// stay within capacity. An insert counts as a use.
    pub fn insert(&self, key: &str, payload: String, ttl: Duration) {
        // Replacing an existing key needs no room
        if !self.entries.contains_key(key) {
            self.evict_to_fit();
        }
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            CachedResponse { payload, inserted_at: now, expires_at: Some(now + ttl) },
        );
        if let Ok(mut order) = self.order.lock() {
            if let Some(pos) = order.iter().position(|k| k == key) {
                order.remove(pos);
            }
            order.push_back(key.to_string());
        }
    }

    /// Pre-seed a payload that never expires and is never evicted
    pub fn seed(&self, key: &str, payload: String) {
        self.entries.insert(
            key.to_string(),
            CachedResponse { payload, inserted_at: Instant::now(), expires_at: None },
        );
    }

    /// Cache-or-compute with singleflight semantics.
    ///
    /// Concurrent callers for the same key share one computation: the first
    /// caller runs `compute`, the rest block on the per-key lock and then
    /// read the freshly inserted entry.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> ServiceResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ServiceResult<String>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let lock = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent flight may have populated the entry while we waited
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let result = compute().await;
        if let Ok(payload) = &result {
            self.insert(key, payload.clone(), ttl);
        }
        drop(_guard);
        self.inflight.remove(key);
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move a key to the most-recently-used end of the eviction order.
    /// Seeds never appear in the order and are left alone.
    fn promote(&self, key: &str) {
        if let Ok(mut order) = self.order.lock() {
            if let Some(pos) = order.iter().position(|k| k == key) {
                if let Some(k) = order.remove(pos) {
                    order.push_back(k);
                }
            }
        }
    }

    fn evict_to_fit(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        let Ok(mut order) = self.order.lock() else {
            return;
        };
        while self.entries.len() >= self.max_entries {
            let Some(coldest) = order.pop_front() else {
                break;
            };
            self.entries.remove(&coldest);
        }
    }

    /// Oldest evictable insertion instant, for diagnostics
    pub fn oldest_inserted_at(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.inserted_at).min()
    }
}
