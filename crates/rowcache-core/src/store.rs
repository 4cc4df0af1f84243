//! Cache store collaborator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Key/value store behind the cache.
///
/// Keys and prefixes are the opaque strings produced by the key builder. The
/// store owns expiry, capacity and persistence; the cache only relies on
/// get/set/delete and prefix deletion.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the bytes stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Delete a single key.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every key starting with `prefix`.
    async fn delete_with_prefix(&self, prefix: &str) -> CacheResult<()>;
}

#[async_trait]
impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        (**self).delete(key).await
    }

    async fn delete_with_prefix(&self, prefix: &str) -> CacheResult<()> {
        (**self).delete_with_prefix(prefix).await
    }
}
