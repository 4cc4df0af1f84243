//! Core abstractions for the rowcache query cache.
//!
//! This crate provides the vocabulary shared by the cache and its hosts:
//! - `Statement` - Read access to a pending query (table, filters, limit, args, SQL)
//! - `BoundArg` - Bound statement arguments
//! - `QueryResult` - The cached `(payload, rows affected)` pair
//! - `CacheConfig` - Per-layer settings
//! - `CacheStore` / `Serializer` - Collaborators the cache talks to

mod config;
mod error;
mod result;
mod serializer;
mod statement;
mod store;
mod value;

pub use config::*;
pub use error::*;
pub use result::*;
pub use serializer::*;
pub use statement::*;
pub use store::*;
pub use value::*;
