//! Decrypted credential cache
//!
//! Holds plaintext values for a fixed time-to-live so repeated lookups
//! skip key derivation. Entries expire lazily on read; `purge_expired`
//! sweeps the rest.

use crate::config::CacheConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use zeroize::Zeroizing;

struct CacheEntry {
    value: Zeroizing<String>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory TTL cache of decrypted credentials
pub struct CredentialCache {
    /// Lifetime of every entry
    ttl: Duration,
    /// Entries by credential name
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Lookups served from cache
    hits: AtomicU64,
    /// Lookups that found nothing live
    misses: AtomicU64,
}

impl CredentialCache {
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        CredentialCache {
            ttl,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live entry, dropping it if it has expired
    pub fn get(&self, name: &str) -> Option<Zeroizing<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(name) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache hit: {}", name);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Re-check under the write lock; a fresh value may have landed
        let mut entries = self.entries.write();
        if entries.get(name).is_some_and(|e| e.is_expired(now)) {
            entries.remove(name);
            debug!("Cache entry expired: {}", name);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace an entry, restarting its lifetime
    pub fn insert(&self, name: impl Into<String>, value: Zeroizing<String>) {
        let name = name.into();
        debug!("Cached: {}", name);
        self.entries.write().insert(
            name,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Remove one entry
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries.write().remove(name).is_some();
        if removed {
            debug!("Removed from cache: {}", name);
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
        info!("Cache cleared");
    }

    /// Drop expired entries, returning how many went
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
        purged
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        CacheStats {
            entries: names.len(),
            names,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    /// Cached names, sorted; never values
    pub names: Vec<String>,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}
