//! In-memory cache store.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rowcache_core::{CacheResult, CacheStore};

use crate::lock::{rw_read, rw_write};

const SOURCE: &str = "rowcache::store";

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local [`CacheStore`] backed by an ordered map.
///
/// Keys are kept sorted so a prefix deletion is a single range scan. Expired
/// entries are invisible to reads and stay in memory until overwritten or
/// removed by [`MemoryStore::purge_expired`].
/// A zero TTL means the entry never expires.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|v| !v.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "contains_key")
            .get(key)
            .is_some_and(|v| !v.is_expired(now))
    }

    /// Live keys in order.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .filter(|(_, v)| !v.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "purge_expired");
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired(now));
        before - entries.len()
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "get");
        Ok(entries
            .get(key)
            .filter(|v| !v.is_expired(now))
            .map(|v| v.bytes.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        };
        rw_write(&self.entries, SOURCE, "set").insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        rw_write(&self.entries, SOURCE, "delete").remove(key);
        Ok(())
    }

    async fn delete_with_prefix(&self, prefix: &str) -> CacheResult<()> {
        let mut entries = rw_write(&self.entries, SOURCE, "delete_with_prefix");
        let doomed: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            entries.remove(&key);
        }
        Ok(())
    }
}
