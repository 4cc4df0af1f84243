//! The caching layer.
//!
//! Reads go through [`CachingLayer::query`]: classify, build a key, look it up,
//! and on a miss execute (optionally coalesced) and store the result. Writes
//! report back through the `after_*` hooks, which schedule prefix evictions
//! for the rows and lists they may have changed.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use rowcache_core::{
    CacheConfig, CacheMode, CacheResult, CacheStore, QueryError, QueryResult, Serializer,
    Statement,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::classify::RowIdentity;
use crate::easer::{Coalesced, Easer, Flight};
use crate::evict::{EvictionReceipt, Evictor};
use crate::key::{CacheKey, KeyBuilder};
use crate::serializer::JsonSerializer;
use crate::stats::CacheStats;

/// A result produced by one execution and handed to every coalesced caller.
struct Landed {
    value: Box<dyn Any + Send + Sync>,
    /// The value as the serializer encoded it, when encoding was requested.
    encoded: Option<Vec<u8>>,
}

type SharedOutcome = Result<Arc<Landed>, QueryError>;

/// The kind of write a hook is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Evictions scheduled by one write.
///
/// Dropping it leaves the evictions running.
#[derive(Debug, Default)]
pub struct Invalidation {
    receipts: Vec<EvictionReceipt>,
}

impl Invalidation {
    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    /// Prefixes scheduled for deletion, in scheduling order.
    pub fn prefixes(&self) -> Vec<&str> {
        self.receipts.iter().map(EvictionReceipt::prefix).collect()
    }

    /// Wait for every scheduled deletion and report each outcome.
    pub async fn settled(self) -> Vec<(String, CacheResult<()>)> {
        join_all(self.receipts.into_iter().map(|receipt| async move {
            let prefix = receipt.prefix().to_string();
            (prefix, receipt.wait().await)
        }))
        .await
    }
}

struct Executed<T> {
    result: QueryResult<T>,
    /// Whether this caller ran the executor whose result it holds.
    leader: bool,
    encoded: Option<Vec<u8>>,
}

/// Read-through, write-invalidate cache in front of a query executor.
///
/// Must be created inside a tokio runtime; it spawns the eviction worker.
pub struct CachingLayer<S, Z = JsonSerializer> {
    config: CacheConfig,
    keys: KeyBuilder,
    store: Arc<S>,
    serializer: Arc<Z>,
    easer: Easer<SharedOutcome>,
    evictor: Evictor,
    stats: Arc<CacheStats>,
}

impl<S> CachingLayer<S, JsonSerializer>
where
    S: CacheStore + 'static,
{
    /// Create a layer that stores results as JSON.
    pub fn with_json(config: CacheConfig, store: S) -> Self {
        Self::new(config, store, JsonSerializer)
    }
}

impl<S, Z> CachingLayer<S, Z>
where
    S: CacheStore + 'static,
    Z: Serializer + 'static,
{
    pub fn new(config: CacheConfig, store: S, serializer: Z) -> Self {
        let store = Arc::new(store);
        let stats = Arc::new(CacheStats::new());
        let evictor = Evictor::spawn(
            Arc::clone(&store),
            config.eviction_queue_depth,
            Arc::clone(&stats),
        );

        Self {
            keys: KeyBuilder::new(config.instance_id.clone()),
            config,
            store,
            serializer: Arc::new(serializer),
            easer: Easer::new(),
            evictor,
            stats,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// Number of reads currently executing under coalescing.
    pub fn in_flight(&self) -> usize {
        self.easer.in_flight()
    }

    fn bypass_reason(&self, stmt: &Statement) -> Option<&'static str> {
        if !self.config.enabled {
            Some("cache disabled")
        } else if !self.config.allows_table(stmt.table_name()) {
            Some("table not cached")
        } else if stmt.mode == CacheMode::Bypass {
            Some("caller opted out")
        } else {
            None
        }
    }

    /// Run a read through the cache.
    ///
    /// Executor errors are returned as-is and never cached. Cache failures
    /// are logged and never returned.
    pub async fn query<T, F, Fut>(
        &self,
        stmt: &Statement,
        executor: F,
    ) -> Result<QueryResult<T>, QueryError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<QueryResult<T>, QueryError>> + Send + 'static,
    {
        let identity = RowIdentity::for_read(stmt);
        let key = self.keys.read_key(stmt, &identity);

        if let Some(reason) = self.bypass_reason(stmt) {
            self.stats.record_bypass();
            debug!(key = %key, table = stmt.table_name(), reason, "Cache bypassed");
            return self
                .execute(&key, executor, false)
                .await
                .map(|executed| executed.result);
        }

        if let Some(hit) = self.lookup::<T>(&key).await {
            return Ok(hit);
        }

        let executed = self.execute(&key, executor, true).await?;
        if executed.leader {
            self.store_result(&key, &executed.result, executed.encoded)
                .await;
        }
        Ok(executed.result)
    }

    async fn lookup<T>(&self, key: &CacheKey) -> Option<QueryResult<T>>
    where
        T: DeserializeOwned,
    {
        let bytes = match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.stats.record_miss();
                debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                self.stats.record_miss();
                warn!(key = %key, error = %e, "Cache lookup failed; executing query");
                return None;
            }
        };

        match self.serializer.deserialize(&bytes) {
            Ok(result) => {
                self.stats.record_hit();
                debug!(key = %key, "Cache hit");
                Some(result)
            }
            Err(e) => {
                self.stats.record_miss();
                debug!(key = %key, error = %e, "Cached value unreadable; executing query");
                None
            }
        }
    }

    async fn execute<T, F, Fut>(
        &self,
        key: &CacheKey,
        executor: F,
        encode: bool,
    ) -> Result<Executed<T>, QueryError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<QueryResult<T>, QueryError>> + Send + 'static,
    {
        if !self.config.easer {
            self.stats.record_execution();
            let result = executor().await?;
            return Ok(Executed {
                result,
                leader: true,
                encoded: None,
            });
        }

        let stats = Arc::clone(&self.stats);
        let serializer = Arc::clone(&self.serializer);
        let flight = move || {
            let fut = executor();
            async move {
                stats.record_execution();
                let result = fut.await?;
                let encoded = if encode {
                    serializer.serialize(&result).ok()
                } else {
                    None
                };
                Ok::<_, QueryError>(Arc::new(Landed {
                    value: Box::new(result),
                    encoded,
                }))
            }
        };

        match self.easer.coalesce(key.as_str(), flight).await {
            Coalesced::Led(flight) => {
                let landed = settle(flight)?;
                let result = self.adopt::<T>(key, &landed).ok_or_else(|| {
                    QueryError::Aborted("shared result has an unexpected type".to_string())
                })?;
                Ok(Executed {
                    result,
                    leader: true,
                    encoded: landed.encoded.clone(),
                })
            }
            Coalesced::Joined(flight, own) => {
                self.stats.record_coalesced();
                let landed = settle(flight)?;
                let result = match self.adopt::<T>(key, &landed) {
                    Some(result) => result,
                    None => {
                        debug!(key = %key, "Coalesced result has another type; executing separately");
                        let own = own().await?;
                        self.adopt::<T>(key, &own).ok_or_else(|| {
                            QueryError::Aborted("shared result has an unexpected type".to_string())
                        })?
                    }
                };
                Ok(Executed {
                    result,
                    leader: false,
                    encoded: None,
                })
            }
        }
    }

    /// Give this caller its own copy of a shared result.
    fn adopt<T>(&self, key: &CacheKey, landed: &Landed) -> Option<QueryResult<T>>
    where
        T: DeserializeOwned + Clone + 'static,
    {
        if let Some(result) = landed.value.downcast_ref::<QueryResult<T>>() {
            return Some(result.clone());
        }
        let bytes = landed.encoded.as_deref()?;
        match self.serializer.deserialize(bytes) {
            Ok(result) => Some(result),
            Err(e) => {
                debug!(key = %key, error = %e, "Cannot re-marshal coalesced result");
                None
            }
        }
    }

    async fn store_result<T>(
        &self,
        key: &CacheKey,
        result: &QueryResult<T>,
        encoded: Option<Vec<u8>>,
    ) where
        T: Serialize,
    {
        let bytes = match encoded {
            Some(bytes) => bytes,
            None => match self.serializer.serialize(result) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.stats.record_store_failure();
                    warn!(key = %key, error = %e, "Failed to encode query result for cache");
                    return;
                }
            },
        };

        match self.store.set(key.as_str(), bytes, self.config.ttl).await {
            Ok(()) => {
                self.stats.record_store();
                debug!(key = %key, "Cached query result");
            }
            Err(e) => {
                self.stats.record_store_failure();
                warn!(key = %key, error = %e, "Failed to store query result in cache");
            }
        }
    }

    /// Invalidate after an insert: only list reads can have changed.
    pub async fn after_create(
        &self,
        stmt: &Statement,
        outcome: &Result<u64, QueryError>,
    ) -> Invalidation {
        self.after_write(WriteKind::Create, stmt, outcome).await
    }

    /// Invalidate after an update: the targeted rows and every list read.
    pub async fn after_update(
        &self,
        stmt: &Statement,
        outcome: &Result<u64, QueryError>,
    ) -> Invalidation {
        self.after_write(WriteKind::Update, stmt, outcome).await
    }

    /// Invalidate after a delete: the targeted rows and every list read.
    pub async fn after_delete(
        &self,
        stmt: &Statement,
        outcome: &Result<u64, QueryError>,
    ) -> Invalidation {
        self.after_write(WriteKind::Delete, stmt, outcome).await
    }

    /// Schedule the evictions a write of `kind` requires.
    ///
    /// Nothing is scheduled when the write failed, the layer is disabled or
    /// the table is not cached.
    pub async fn after_write(
        &self,
        kind: WriteKind,
        stmt: &Statement,
        outcome: &Result<u64, QueryError>,
    ) -> Invalidation {
        let table = stmt.table_name();
        if let Err(e) = outcome {
            debug!(table, op = %kind, error = %e, "Write failed; nothing to invalidate");
            return Invalidation::default();
        }
        if !self.config.enabled || !self.config.allows_table(table) {
            return Invalidation::default();
        }

        let mut prefixes = Vec::with_capacity(2);
        if kind != WriteKind::Create {
            for row in RowIdentity::for_write(stmt).split_rows() {
                prefixes.push(self.keys.prefix(table, &row));
            }
        }
        prefixes.push(self.keys.prefix(table, &RowIdentity::List));

        debug!(table, op = %kind, prefixes = ?prefixes, "Scheduling invalidation");
        self.schedule(prefixes).await
    }

    /// Run a write and invalidate after it, returning the write's own outcome.
    ///
    /// Does not wait for the evictions.
    pub async fn write<F, Fut>(
        &self,
        kind: WriteKind,
        stmt: &Statement,
        executor: F,
    ) -> Result<u64, QueryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, QueryError>>,
    {
        let outcome = executor().await;
        self.after_write(kind, stmt, &outcome).await;
        outcome
    }

    /// Evict every cached read of `table`.
    pub async fn purge_table(&self, table: &str) -> Invalidation {
        self.schedule(vec![self.keys.table(table)]).await
    }

    async fn schedule(&self, prefixes: Vec<String>) -> Invalidation {
        let mut receipts = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            receipts.push(self.evictor.schedule(prefix).await);
        }
        Invalidation { receipts }
    }

    /// Wait until every eviction scheduled so far has run.
    pub async fn flush(&self) {
        self.evictor.flush().await;
    }

    /// Stop accepting evictions and drain the queue.
    pub async fn shutdown(&self) {
        self.evictor.shutdown().await;
    }
}

fn settle(flight: Flight<SharedOutcome>) -> SharedOutcome {
    match flight {
        Flight::Landed(outcome) => outcome,
        Flight::Aborted(message) => Err(QueryError::Aborted(message)),
    }
}
