use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use rowcache::{
    BoundArg, CacheConfig, CacheError, CacheResult, CacheStore, CachingLayer, ColumnRef,
    FilterExpr, MemoryStore, QueryError, QueryResult, Statement, TableSchema, WriteKind,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UserName {
    name: String,
}

type Rows = Result<QueryResult<Vec<User>>, QueryError>;

struct Db {
    rows: Mutex<Vec<User>>,
    executions: AtomicUsize,
    latency: Duration,
}

impl Db {
    fn seeded(count: i64, latency: Duration) -> Arc<Self> {
        let rows = (1..=count)
            .map(|id| User {
                id,
                name: format!("user{}", id),
            })
            .collect();
        Arc::new(Self {
            rows: Mutex::new(rows),
            executions: AtomicUsize::new(0),
            latency,
        })
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn rename(&self, id: i64, name: &str) -> Result<u64, QueryError> {
        let mut rows = self.rows.lock().unwrap();
        let mut affected = 0;
        for user in rows.iter_mut().filter(|u| u.id == id) {
            user.name = name.to_string();
            affected += 1;
        }
        Ok(affected)
    }
}

fn select(db: &Arc<Db>, id: Option<i64>) -> impl FnOnce() -> BoxFuture<'static, Rows> + Send + 'static {
    let db = Arc::clone(db);
    move || {
        async move {
            db.executions.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(db.latency).await;
            let rows: Vec<User> = db
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|u| id.map_or(true, |id| u.id == id))
                .cloned()
                .collect();
            Ok(QueryResult::from_rows(rows))
        }
        .boxed()
    }
}

fn schema() -> TableSchema {
    TableSchema::new("users").with_primary_key("id")
}

fn find_stmt(id: i64) -> Statement {
    Statement::new("users")
        .with_schema(schema())
        .filter(FilterExpr::eq(ColumnRef::named("id"), id))
        .limit(1)
        .sql("SELECT * FROM users WHERE id = ? ORDER BY id LIMIT 1")
        .arg(id)
}

fn list_stmt() -> Statement {
    Statement::new("users")
        .with_schema(schema())
        .sql("SELECT * FROM users")
}

fn update_stmt(id: i64) -> Statement {
    Statement::new("users")
        .with_schema(schema())
        .filter(FilterExpr::eq(ColumnRef::named("id"), id))
        .sql("UPDATE users SET name = ? WHERE id = ?")
        .args([BoundArg::from("renamed"), BoundArg::from(id)])
}

fn layer(config: CacheConfig) -> CachingLayer<MemoryStore> {
    CachingLayer::with_json(config, MemoryStore::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_reads_execute_once() {
    let db = Db::seeded(3, Duration::from_millis(50));
    let layer = layer(CacheConfig::new("e2e").with_easer(true));
    let stmt = list_stmt();

    let results = join_all((0..8).map(|_| layer.query(&stmt, select(&db, None)))).await;

    assert_eq!(db.executions(), 1);
    for result in results {
        assert_eq!(result.unwrap().rows_affected, 3);
    }
    let snap = layer.stats().snapshot();
    assert_eq!(snap.coalesced, 7);
    assert_eq!(snap.stores, 1);
    assert_eq!(layer.store().len(), 1);
    assert_eq!(layer.in_flight(), 0);
}

#[tokio::test]
async fn update_evicts_only_its_row_and_lists() {
    let db = Db::seeded(10, Duration::ZERO);
    let layer = layer(CacheConfig::new("e2e"));

    layer.query(&find_stmt(5), select(&db, Some(5))).await.unwrap();
    layer.query(&find_stmt(7), select(&db, Some(7))).await.unwrap();
    layer.query(&list_stmt(), select(&db, None)).await.unwrap();
    assert_eq!(layer.store().len(), 3);

    let outcome = db.rename(5, "renamed");
    let invalidation = layer.after_update(&update_stmt(5), &outcome).await;
    assert_eq!(
        invalidation.prefixes(),
        vec!["INSTANCE_e2e:TABLE_users:5", "INSTANCE_e2e:TABLE_users:LIST"]
    );
    for (prefix, result) in invalidation.settled().await {
        assert!(result.is_ok(), "eviction of {} failed", prefix);
    }

    let keys = layer.store().keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("INSTANCE_e2e:TABLE_users:7-"));
}

#[tokio::test]
async fn stale_reads_are_not_served_after_update() {
    let db = Db::seeded(3, Duration::ZERO);
    let layer = layer(CacheConfig::new("e2e"));

    let two = layer.query(&find_stmt(2), select(&db, Some(2))).await.unwrap();
    layer.query(&find_stmt(3), select(&db, Some(3))).await.unwrap();
    layer.query(&list_stmt(), select(&db, None)).await.unwrap();
    assert_eq!(two.dest[0].name, "user2");
    assert_eq!(db.executions(), 3);

    let stmt = update_stmt(2);
    let db_for_write = Arc::clone(&db);
    layer
        .write(WriteKind::Update, &stmt, || async move {
            db_for_write.rename(2, "renamed")
        })
        .await
        .unwrap();
    layer.flush().await;

    let list = layer.query(&list_stmt(), select(&db, None)).await.unwrap();
    assert_eq!(db.executions(), 4);
    assert!(list.dest.iter().any(|u| u.name == "renamed"));

    let two = layer.query(&find_stmt(2), select(&db, Some(2))).await.unwrap();
    assert_eq!(db.executions(), 5);
    assert_eq!(two.dest[0].name, "renamed");

    layer.query(&find_stmt(3), select(&db, Some(3))).await.unwrap();
    assert_eq!(db.executions(), 5);
}

#[tokio::test]
async fn multi_row_update_evicts_each_row() {
    let db = Db::seeded(3, Duration::ZERO);
    let layer = layer(CacheConfig::new("e2e"));
    for id in 1..=3 {
        layer.query(&find_stmt(id), select(&db, Some(id))).await.unwrap();
    }
    assert_eq!(db.executions(), 3);

    db.rename(1, "new1").unwrap();
    db.rename(2, "new2").unwrap();
    let update = Statement::new("users")
        .with_schema(schema())
        .filter(FilterExpr::is_in(ColumnRef::named("id"), [1, 2, 1]))
        .sql("UPDATE users SET name = ? WHERE id IN (?)");
    let invalidation = layer.after_update(&update, &Ok(2)).await;
    assert_eq!(
        invalidation.prefixes(),
        vec![
            "INSTANCE_e2e:TABLE_users:1",
            "INSTANCE_e2e:TABLE_users:2",
            "INSTANCE_e2e:TABLE_users:LIST",
        ]
    );
    for (_, result) in invalidation.settled().await {
        result.unwrap();
    }

    let one = layer.query(&find_stmt(1), select(&db, Some(1))).await.unwrap();
    let two = layer.query(&find_stmt(2), select(&db, Some(2))).await.unwrap();
    assert_eq!(one.dest[0].name, "new1");
    assert_eq!(two.dest[0].name, "new2");
    assert_eq!(db.executions(), 5);

    layer.query(&find_stmt(3), select(&db, Some(3))).await.unwrap();
    assert_eq!(db.executions(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coalesced_callers_share_one_execution_error() {
    let executions = Arc::new(AtomicUsize::new(0));
    let layer = layer(CacheConfig::new("e2e").with_easer(true));
    let stmt = list_stmt();

    let failing = |count: Arc<AtomicUsize>| {
        move || {
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                let result: Rows = Err(QueryError::execution("deadlock detected"));
                result
            }
            .boxed()
        }
    };

    let results = join_all(
        (0..5).map(|_| layer.query(&stmt, failing(Arc::clone(&executions)))),
    )
    .await;

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(
            result.unwrap_err(),
            QueryError::Execution("deadlock detected".to_string())
        );
    }
    assert!(layer.store().is_empty());
    assert_eq!(layer.in_flight(), 0);
    assert_eq!(layer.stats().snapshot().stores, 0);
}

#[tokio::test]
async fn failed_write_evicts_nothing() {
    let db = Db::seeded(2, Duration::ZERO);
    let layer = layer(CacheConfig::new("e2e"));
    layer.query(&list_stmt(), select(&db, None)).await.unwrap();

    let result = layer
        .write(WriteKind::Delete, &update_stmt(1), || async {
            Err(QueryError::execution("deadlock"))
        })
        .await;
    layer.flush().await;

    assert!(result.is_err());
    assert_eq!(layer.store().len(), 1);
}

#[tokio::test]
async fn purge_table_evicts_every_scope() {
    let db = Db::seeded(3, Duration::ZERO);
    let layer = layer(CacheConfig::new("e2e"));
    layer.query(&find_stmt(1), select(&db, Some(1))).await.unwrap();
    layer.query(&list_stmt(), select(&db, None)).await.unwrap();

    let purge = layer.purge_table("users").await;
    assert_eq!(purge.prefixes(), vec!["INSTANCE_e2e:TABLE_users:"]);
    purge.settled().await;

    assert!(layer.store().is_empty());
    assert_eq!(layer.stats().snapshot().evictions, 1);
}

struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::Storage("unavailable".into()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Storage("unavailable".into()))
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Storage("unavailable".into()))
    }

    async fn delete_with_prefix(&self, _prefix: &str) -> CacheResult<()> {
        Err(CacheError::Storage("unavailable".into()))
    }
}

#[tokio::test]
async fn store_failures_never_reach_the_caller() {
    let db = Db::seeded(2, Duration::ZERO);
    let layer = CachingLayer::with_json(CacheConfig::new("e2e"), FailingStore);

    let first = layer.query(&list_stmt(), select(&db, None)).await.unwrap();
    let second = layer.query(&list_stmt(), select(&db, None)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(db.executions(), 2);

    let invalidation = layer.after_create(&list_stmt(), &Ok(1)).await;
    let settled = invalidation.settled().await;
    assert_eq!(settled.len(), 1);
    assert!(settled[0].1.is_err());

    let snap = layer.stats().snapshot();
    assert_eq!(snap.store_failures, 2);
    assert_eq!(snap.eviction_failures, 1);
    assert_eq!(snap.misses, 2);
}

#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn delete_with_prefix(&self, prefix: &str) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_with_prefix(prefix).await
    }
}

#[tokio::test]
async fn bypassed_reads_never_touch_the_store() {
    let db = Db::seeded(2, Duration::ZERO);
    let configs = [
        (CacheConfig::disabled(), list_stmt()),
        (CacheConfig::new("e2e").with_tables(["orders"]), list_stmt()),
        (CacheConfig::new("e2e"), list_stmt().bypass_cache()),
    ];

    for (config, stmt) in configs {
        let layer = CachingLayer::with_json(config, CountingStore::default());
        layer.query(&stmt, select(&db, None)).await.unwrap();
        layer.query(&stmt, select(&db, None)).await.unwrap();
        layer.after_update(&stmt, &Ok(1)).await.settled().await;

        if stmt.mode == rowcache::CacheMode::Bypass {
            // opted-out reads still invalidate on write
            assert_eq!(layer.store().calls.load(Ordering::SeqCst), 1);
        } else {
            assert_eq!(layer.store().calls.load(Ordering::SeqCst), 0);
        }
        assert_eq!(layer.stats().snapshot().bypasses, 2);
    }
    assert_eq!(db.executions(), 6);
}

#[tokio::test]
async fn joiner_with_other_type_gets_remarshalled_value() {
    let db = Db::seeded(2, Duration::from_millis(50));
    let layer = layer(CacheConfig::new("e2e").with_easer(true));
    let stmt = list_stmt();

    let names_executed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&names_executed);
    let (users, names) = tokio::join!(
        layer.query(&stmt, select(&db, None)),
        layer.query(&stmt, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(QueryResult::<Vec<UserName>>::from_rows(vec![]))
        }),
    );

    let users = users.unwrap();
    let names = names.unwrap();
    assert_eq!(db.executions(), 1);
    assert_eq!(names_executed.load(Ordering::SeqCst), 0);
    assert_eq!(names.rows_affected, users.rows_affected);
    assert_eq!(
        names.dest,
        vec![
            UserName {
                name: "user1".into()
            },
            UserName {
                name: "user2".into()
            },
        ]
    );
}

fn crashing() -> impl FnOnce() -> BoxFuture<'static, Rows> + Send + 'static {
    || {
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if true {
                panic!("connection reset");
            }
            Ok(QueryResult::from_rows(vec![]))
        }
        .boxed()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_executor_aborts_every_waiter() {
    let db = Db::seeded(1, Duration::ZERO);
    let layer = layer(CacheConfig::new("e2e").with_easer(true));
    let stmt = list_stmt();

    let results = join_all((0..3).map(|_| layer.query(&stmt, crashing()))).await;
    for result in results {
        assert_eq!(
            result.unwrap_err(),
            QueryError::Aborted("connection reset".to_string())
        );
    }
    assert_eq!(layer.in_flight(), 0);
    assert!(layer.store().is_empty());

    let fresh = layer.query(&stmt, select(&db, None)).await.unwrap();
    assert_eq!(fresh.rows_affected, 1);
}

#[tokio::test]
async fn shutdown_drains_pending_evictions() {
    let db = Db::seeded(1, Duration::ZERO);
    let layer = layer(CacheConfig::new("e2e").with_eviction_queue_depth(1));
    layer.query(&list_stmt(), select(&db, None)).await.unwrap();

    drop(layer.after_create(&list_stmt(), &Ok(1)).await);
    layer.shutdown().await;

    assert!(layer.store().is_empty());
    let late = layer.after_create(&list_stmt(), &Ok(1)).await;
    let settled = late.settled().await;
    assert_eq!(settled[0].1, Err(CacheError::WorkerStopped));
}
