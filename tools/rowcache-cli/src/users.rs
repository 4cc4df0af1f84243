//! In-memory `users` table the demo queries through the cache.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use rowcache::{BoundArg, ColumnRef, FilterExpr, QueryError, QueryResult, Statement, TableSchema};
use serde::{Deserialize, Serialize};

pub const TABLE: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

pub type Read<T> = BoxFuture<'static, Result<QueryResult<T>, QueryError>>;

/// A table with simulated latency that counts every query it serves.
pub struct UsersTable {
    rows: RwLock<BTreeMap<i64, User>>,
    executions: AtomicUsize,
    latency: Duration,
}

impl UsersTable {
    pub fn seeded(count: u32, latency: Duration) -> Arc<Self> {
        let rows = (1..=i64::from(count))
            .map(|id| {
                let user = User {
                    id,
                    name: format!("user{}", id),
                    email: format!("user{}@example.com", id),
                };
                (id, user)
            })
            .collect();

        Arc::new(Self {
            rows: RwLock::new(rows),
            executions: AtomicUsize::new(0),
            latency,
        })
    }

    /// Queries served so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn schema() -> TableSchema {
        TableSchema::new(TABLE).with_primary_key("id")
    }

    pub fn find_statement(id: i64) -> Statement {
        Statement::new(TABLE)
            .with_schema(Self::schema())
            .filter(FilterExpr::eq(ColumnRef::named("id"), id))
            .limit(1)
            .sql("SELECT * FROM `users` WHERE `users`.`id` = ? ORDER BY `users`.`id` LIMIT 1")
            .arg(id)
    }

    pub fn list_statement() -> Statement {
        Statement::new(TABLE)
            .with_schema(Self::schema())
            .sql("SELECT * FROM `users`")
    }

    pub fn update_statement(id: i64, name: &str) -> Statement {
        Statement::new(TABLE)
            .with_schema(Self::schema())
            .filter(FilterExpr::eq(ColumnRef::named("id"), id))
            .sql("UPDATE `users` SET `name` = ? WHERE `users`.`id` = ?")
            .args([BoundArg::from(name), BoundArg::from(id)])
    }

    /// Executor for a primary-key lookup.
    pub fn find(self: &Arc<Self>, id: i64) -> impl FnOnce() -> Read<User> + Send + 'static {
        let table = Arc::clone(self);
        move || {
            async move {
                table.begin().await;
                let rows = table
                    .rows
                    .read()
                    .map_err(|_| QueryError::execution("users table lock poisoned"))?;
                let user = rows.get(&id).cloned().ok_or(QueryError::NotFound)?;
                Ok(QueryResult::new(user, 1))
            }
            .boxed()
        }
    }

    /// Executor for a full scan.
    pub fn list(self: &Arc<Self>) -> impl FnOnce() -> Read<Vec<User>> + Send + 'static {
        let table = Arc::clone(self);
        move || {
            async move {
                table.begin().await;
                let rows = table
                    .rows
                    .read()
                    .map_err(|_| QueryError::execution("users table lock poisoned"))?;
                Ok(QueryResult::from_rows(rows.values().cloned().collect()))
            }
            .boxed()
        }
    }

    /// Rename a user, returning the number of affected rows.
    pub async fn rename(&self, id: i64, name: &str) -> Result<u64, QueryError> {
        self.begin().await;
        let mut rows = self
            .rows
            .write()
            .map_err(|_| QueryError::execution("users table lock poisoned"))?;
        match rows.get_mut(&id) {
            Some(user) => {
                user.name = name.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn begin(&self) {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}
