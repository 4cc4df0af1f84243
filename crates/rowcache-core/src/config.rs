//! Cache layer configuration.

use std::collections::BTreeSet;
use std::time::Duration;

/// Default time-to-live for cached reads.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default bound on queued eviction jobs.
pub const DEFAULT_EVICTION_QUEUE_DEPTH: usize = 256;

/// Settings for one caching layer.
///
/// Handed to the layer at construction and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Namespace prepended to every key (`INSTANCE_<id>`).
    pub instance_id: String,
    /// Time-to-live passed to the store for every cached read.
    pub ttl: Duration,
    /// Tables that participate in caching. Empty means all tables.
    pub tables: BTreeSet<String>,
    /// Whether concurrent identical reads are coalesced.
    pub easer: bool,
    /// Global switch; a disabled layer behaves as if it was not installed.
    pub enabled: bool,
    /// Maximum number of eviction jobs waiting for the worker.
    pub eviction_queue_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            instance_id: String::new(),
            ttl: DEFAULT_TTL,
            tables: BTreeSet::new(),
            easer: false,
            enabled: true,
            eviction_queue_depth: DEFAULT_EVICTION_QUEUE_DEPTH,
        }
    }
}

impl CacheConfig {
    /// Create a configuration for the given instance namespace.
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Default::default()
        }
    }

    /// Create a disabled configuration.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Restrict caching to the given tables.
    pub fn with_tables<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable request coalescing.
    pub fn with_easer(mut self, easer: bool) -> Self {
        self.easer = easer;
        self
    }

    /// Enable or disable the cache.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the eviction queue depth (at least 1).
    pub fn with_eviction_queue_depth(mut self, depth: usize) -> Self {
        self.eviction_queue_depth = depth.max(1);
        self
    }

    /// Check whether reads and writes against `table` use the cache.
    pub fn allows_table(&self, table: &str) -> bool {
        self.tables.is_empty() || self.tables.contains(table)
    }
}
