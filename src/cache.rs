//! LRU+TTL cache (C4, §4.4).
//!
//! A bounded `String -> String` map with per-entry expiry. `get` promotes
//! recency and lazily evicts an expired entry on touch; `set` evicts the
//! least-recently-used entry once the map exceeds capacity. Process-wide and
//! shared across handlers, so every operation is guarded by a single mutex
//! (§5, §9: "a single `tokio::sync::Mutex<LruCache>`... is chosen over
//! sharding").

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Running hit/miss/eviction counters (§4.4).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Recency order, oldest first. Touched keys move to the back.
    order: Vec<String>,
    max_size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

/// Bounded, TTL-aware, concurrency-safe LRU cache (§4.4).
pub struct LruTtlCache {
    inner: Mutex<Inner>,
}

impl LruTtlCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                max_size,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Returns the value and promotes recency, unless the entry is expired (in
    /// which case it's lazily removed and treated as a miss).
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if expired {
            inner.remove(key);
            inner.misses += 1;
            return None;
        }

        inner.touch(key);
        inner.hits += 1;
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Inserts or refreshes `key`, then evicts the least-recently-used entry
    /// if the map now exceeds `max_size`.
    pub async fn set(&self, key: String, value: String, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        let expires_at = Instant::now() + ttl;

        if inner.entries.contains_key(&key) {
            inner.touch(&key);
        } else {
            inner.order.push(key.clone());
        }
        inner.entries.insert(key, Entry { value, expires_at });

        while inner.entries.len() > inner.max_size && !inner.order.is_empty() {
            let lru_key = inner.order.remove(0);
            inner.entries.remove(&lru_key);
            inner.evictions += 1;
        }
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.order.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            size: inner.entries.len(),
            max_size: inner.max_size,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}
