//! Query results as captured and restored by the cache.

use serde::{Deserialize, Serialize};

/// The outcome of a read: the destination payload and the affected row count.
///
/// This is exactly what is serialized into the cache and restored on a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult<T> {
    /// Destination payload (a row, a list of rows, a scalar...).
    pub dest: T,
    /// Number of rows the query affected.
    pub rows_affected: u64,
}

impl<T> QueryResult<T> {
    /// Create a new query result.
    pub fn new(dest: T, rows_affected: u64) -> Self {
        Self {
            dest,
            rows_affected,
        }
    }

    /// Consume the result, returning the payload.
    pub fn into_dest(self) -> T {
        self.dest
    }

    /// Map the payload, keeping the row count.
    pub fn map<U, F>(self, f: F) -> QueryResult<U>
    where
        F: FnOnce(T) -> U,
    {
        QueryResult {
            dest: f(self.dest),
            rows_affected: self.rows_affected,
        }
    }
}

impl<T> QueryResult<Vec<T>> {
    /// Build a result from a list of rows, counting them.
    pub fn from_rows(rows: Vec<T>) -> Self {
        let rows_affected = rows.len() as u64;
        Self::new(rows, rows_affected)
    }
}
