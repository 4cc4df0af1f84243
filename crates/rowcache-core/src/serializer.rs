//! Value serializer collaborator.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheResult;

/// Byte encoding for cached query results.
///
/// Must round-trip a [`QueryResult`](crate::QueryResult) losslessly.
pub trait Serializer: Send + Sync {
    /// Encode a value.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<Vec<u8>>;

    /// Decode a value.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> CacheResult<T>;
}
