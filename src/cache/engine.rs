// Two-tier cache engine.
// Bounded in-memory map with TTL expiry, written through to a persistent store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::Result;

use super::clock::{Clock, SystemClock};
use super::store::PersistentStore;

/// A cached value with its lifetime. Persisted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Where a `set` lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Memory and persistent store.
    #[default]
    WriteThrough,
    /// Memory only; the persistent store is left untouched.
    MemoryOnly,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_items: usize,
    pub max_items: usize,
    pub default_ttl: Duration,
}

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub memory_purged: usize,
    pub persisted_purged: usize,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry<Value>,
    /// Insertion sequence; breaks `created_at` ties during eviction.
    seq: u64,
}

#[derive(Debug, Default)]
struct Memory {
    slots: HashMap<String, Slot>,
    next_seq: u64,
}

impl Memory {
    fn insert(&mut self, key: String, entry: CacheEntry<Value>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(key, Slot { entry, seq });
    }

    /// Drop the oldest entries until at most `max` remain.
    fn evict_to(&mut self, max: usize) {
        if self.slots.len() <= max {
            return;
        }

        let mut by_age: Vec<(DateTime<Utc>, u64, String)> = self
            .slots
            .iter()
            .map(|(k, slot)| (slot.entry.created_at, slot.seq, k.clone()))
            .collect();
        by_age.sort();

        let excess = self.slots.len() - max;
        for (_, _, key) in by_age.into_iter().take(excess) {
            debug!(key = %key, "evicting from memory");
            self.slots.remove(&key);
        }
    }
}

/// Cache with a bounded memory tier over a persistent tier.
///
/// Eviction is by insertion age, not access recency: a frequently read entry
/// is still evicted first if it was written longest ago. Evicted entries
/// remain readable from the persistent store until they expire.
pub struct CacheEngine<S> {
    config: CacheConfig,
    store: S,
    clock: Arc<dyn Clock>,
    memory: Mutex<Memory>,
}

impl<S: PersistentStore> CacheEngine<S> {
    /// Create an engine over `store` driven by the system clock.
    pub fn new(config: CacheConfig, store: S) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create an engine that reads time from `clock`.
    pub fn with_clock(config: CacheConfig, store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
            memory: Mutex::new(Memory::default()),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the underlying persistent store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current time as seen by this engine's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Namespaced key under which `key` is stored.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn memory(&self) -> MutexGuard<'_, Memory> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `value` under `key` for `ttl`.
    ///
    /// A zero TTL produces an entry that is already expired, so the write
    /// degenerates to removing whatever was cached under `key`. Persistent
    /// store failures are logged; the memory write stands regardless.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        placement: Placement,
    ) -> Result<()> {
        if ttl.is_zero() {
            debug!(key, "zero ttl, dropping entry instead of writing");
            self.delete(key);
            return Ok(());
        }

        let value = serde_json::to_value(value)?;
        let created_at = self.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry {
            value,
            expires_at,
            created_at,
        };
        let storage_key = self.storage_key(key);

        let persisted = match placement {
            Placement::WriteThrough => Some(serde_json::to_value(&entry)?),
            Placement::MemoryOnly => None,
        };

        {
            let mut memory = self.memory();
            memory.insert(storage_key.clone(), entry);
            memory.evict_to(self.config.max_items);
        }

        if let Some(persisted) = persisted {
            if let Err(e) = self.store.set(&storage_key, &persisted) {
                warn!(key = %storage_key, error = %e, "failed to write persistent cache");
            }
        }

        Ok(())
    }

    /// Store `value` under `key` with the configured default TTL.
    pub fn set_with_default_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, value, self.config.default_ttl(), Placement::WriteThrough)
    }

    /// Live entry for `key`, checking memory then the persistent store.
    ///
    /// Persistent hits are promoted into memory. An expired entry is removed
    /// from both tiers and reported as absent.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<Value>> {
        let storage_key = self.storage_key(key);
        let now = self.now();

        let in_memory = self
            .memory()
            .slots
            .get(&storage_key)
            .map(|slot| slot.entry.clone());

        let entry = match in_memory {
            Some(entry) => entry,
            None => {
                let entry = self.read_persisted(&storage_key)?;
                if !entry.is_expired(now) {
                    let mut memory = self.memory();
                    memory.insert(storage_key.clone(), entry.clone());
                    memory.evict_to(self.config.max_items);
                }
                entry
            }
        };

        if entry.is_expired(now) {
            debug!(key = %storage_key, "entry expired");
            self.delete(key);
            return None;
        }

        Some(entry)
    }

    /// Typed value for `key`, or `None` if absent, expired, or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.get_entry(key)?;
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Check if a live entry exists for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get_entry(key).is_some()
    }

    /// Remove `key` from both tiers. Idempotent.
    pub fn delete(&self, key: &str) {
        let storage_key = self.storage_key(key);
        self.memory().slots.remove(&storage_key);
        if let Err(e) = self.store.remove(&storage_key) {
            warn!(key = %storage_key, error = %e, "failed to delete persistent cache");
        }
    }

    /// Purge expired entries from memory and from every namespaced persisted key.
    ///
    /// Undecodable persisted entries are skipped.
    pub fn sweep_expired(&self) -> SweepReport {
        let now = self.now();
        let mut report = SweepReport::default();

        {
            let mut memory = self.memory();
            let before = memory.slots.len();
            memory.slots.retain(|_, slot| !slot.entry.is_expired(now));
            report.memory_purged = before - memory.slots.len();
        }

        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list persistent cache keys");
                return report;
            }
        };

        for key in keys
            .iter()
            .filter(|k| k.starts_with(&self.config.key_prefix))
        {
            let Some(entry) = self.read_persisted(key) else {
                continue;
            };
            if entry.is_expired(now) {
                match self.store.remove(key) {
                    Ok(()) => report.persisted_purged += 1,
                    Err(e) => warn!(key = %key, error = %e, "failed to purge expired entry"),
                }
            }
        }

        debug!(
            memory = report.memory_purged,
            persisted = report.persisted_purged,
            "swept expired cache entries"
        );
        report
    }

    /// Empty memory and remove every persisted key under the cache prefix.
    pub fn clear(&self) {
        {
            let mut memory = self.memory();
            memory.slots.clear();
        }

        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to clear persistent cache");
                return;
            }
        };

        for key in keys
            .iter()
            .filter(|k| k.starts_with(&self.config.key_prefix))
        {
            if let Err(e) = self.store.remove(key) {
                warn!(key = %key, error = %e, "failed to clear persistent cache entry");
            }
        }
    }

    /// Snapshot of memory tier occupancy and configured limits.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_items: self.memory().slots.len(),
            max_items: self.config.max_items,
            default_ttl: self.config.default_ttl(),
        }
    }

    /// Whether `key` currently sits in the memory tier, expired or not.
    #[cfg(test)]
    pub(crate) fn in_memory(&self, key: &str) -> bool {
        self.memory().slots.contains_key(&self.storage_key(key))
    }

    /// Read and decode a persisted entry. Read failures and corrupt entries are misses.
    fn read_persisted(&self, storage_key: &str) -> Option<CacheEntry<Value>> {
        let raw = match self.store.get(storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "failed to read persistent cache");
                return None;
            }
        };

        match serde_json::from_value(raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %storage_key, error = %e, "skipping corrupt cache entry");
                None
            }
        }
    }
}
