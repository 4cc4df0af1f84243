//! Read-through, write-invalidate query cache.
//!
//! This crate provides:
//! - `CachingLayer` - Wraps a query executor with caching, coalescing and invalidation
//! - `RowIdentity` - Detail/list classification of a statement's filters
//! - `CacheKey` / `KeyBuilder` - Namespaced cache keys and eviction prefixes
//! - `Easer` - Request coalescing for identical in-flight reads
//! - `MemoryStore` / `JsonSerializer` - In-process store and JSON encoding
//! - `CacheStats` - Hit, miss, execution and eviction counters
//!
//! # Example
//!
//! ```ignore
//! use rowcache::{CacheConfig, CachingLayer, MemoryStore, QueryResult, Statement};
//!
//! let layer = CachingLayer::with_json(CacheConfig::new("A1").with_easer(true), MemoryStore::new());
//!
//! let user = layer
//!     .query(&stmt, move || async move { db.find_user(2).await })
//!     .await?;
//!
//! let outcome = db.rename_user(2, "bob").await;
//! layer.after_update(&update_stmt, &outcome).await;
//! ```

mod classify;
mod easer;
mod evict;
mod key;
mod layer;
mod lock;
mod serializer;
mod stats;
mod store;

pub use classify::*;
pub use easer::*;
pub use evict::*;
pub use key::*;
pub use layer::*;
pub use serializer::*;
pub use stats::*;
pub use store::*;

pub use rowcache_core::*;
