//! Cache key composition.
//!
//! Keys look like `INSTANCE_<ns>:TABLE_<table>:<segment>-<hash>`. Eviction
//! deletes by the prefix that omits `-<hash>`.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rowcache_core::{BoundArg, Statement};

use crate::classify::RowIdentity;

/// A fully-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-built key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether an eviction of `prefix` would remove this key.
    pub fn starts_with_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Render bound arguments as `[a b c]`, nested lists included.
pub fn format_args(args: &[BoundArg]) -> String {
    let mut out = String::from("[");
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    out.push(']');
    out
}

/// Hash a statement and its arguments into a key suffix.
///
/// Deterministic standard base64 of `<sql>-<formatted args>`.
pub fn hash_statement(sql: &str, args: &[BoundArg]) -> String {
    STANDARD.encode(format!("{}-{}", sql, format_args(args)))
}

/// Prefix covering every key of one table.
pub fn table_prefix(instance: &str, table: &str) -> String {
    format!("INSTANCE_{}:TABLE_{}:", instance, table)
}

/// Prefix covering every read of `identity` in `table`.
pub fn build_prefix_key(instance: &str, table: &str, identity: &RowIdentity) -> String {
    format!("{}{}", table_prefix(instance, table), identity.segment())
}

/// Key for one read.
pub fn build_read_key(
    instance: &str,
    table: &str,
    identity: &RowIdentity,
    sql: &str,
    args: &[BoundArg],
) -> CacheKey {
    CacheKey(format!(
        "{}-{}",
        build_prefix_key(instance, table, identity),
        hash_statement(sql, args)
    ))
}

/// Key builder bound to one instance namespace.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    instance: String,
}

impl KeyBuilder {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Key for a read statement already classified as `identity`.
    pub fn read_key(&self, stmt: &Statement, identity: &RowIdentity) -> CacheKey {
        build_read_key(
            &self.instance,
            stmt.table_name(),
            identity,
            &stmt.sql,
            &stmt.args,
        )
    }

    pub fn prefix(&self, table: &str, identity: &RowIdentity) -> String {
        build_prefix_key(&self.instance, table, identity)
    }

    pub fn table(&self, table: &str) -> String {
        table_prefix(&self.instance, table)
    }
}
