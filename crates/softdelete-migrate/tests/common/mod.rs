//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use softdelete_migrate::drivers::SqliteConnection;
use softdelete_migrate::{DbConnection, DialectImpl, MigrateError, Result, Row, SqlValue};

pub const DELETED_AT: &str = "2021-06-01 00:00:00";
pub const RECENTLY_DELETED_AT: &str = "2023-03-01 00:00:00";
/// Rows deleted before this date are old enough to archive.
pub const CUTOFF: &str = "2022-01-01";

pub async fn memory() -> Arc<SqliteConnection> {
    Arc::new(SqliteConnection::connect("sqlite::memory:").await.unwrap())
}

/// `users` with `total` rows, every tenth one soft-deleted.
pub async fn seed_users(conn: &dyn DbConnection, total: usize) {
    conn.execute(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT, deleted_at TEXT)",
        &[],
    )
    .await
    .unwrap();
    conn.execute(
        &format!(
            "INSERT INTO users (id, name, email, deleted_at) \
             WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < {total}) \
             SELECT n, 'user' || n, 'user' || n || '@example.com', \
             CASE WHEN n % 10 = 0 THEN '{DELETED_AT}' END FROM seq"
        ),
        &[],
    )
    .await
    .unwrap();
}

/// Soft-delete every row with `id % 10 = 5` after [`CUTOFF`].
pub async fn mark_recently_deleted(conn: &dyn DbConnection) {
    conn.execute(
        &format!("UPDATE users SET deleted_at = '{RECENTLY_DELETED_AT}' WHERE id % 10 = 5"),
        &[],
    )
    .await
    .unwrap();
}

pub async fn count(conn: &dyn DbConnection, sql: &str) -> i64 {
    let rows = conn.query(sql, &[]).await.unwrap();
    rows[0].get("c").and_then(|v| v.as_i64()).unwrap()
}

/// Delegates to an inner connection and counts calls.
pub struct RecordingConnection {
    inner: Arc<dyn DbConnection>,
    pub queries: AtomicUsize,
    pub executes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl RecordingConnection {
    pub fn new(inner: Arc<dyn DbConnection>) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DbConnection for RecordingConnection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dialect(&self) -> &DialectImpl {
        self.inner.dialect()
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql, params).await
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Fails every statement starting with `prefix`.
pub struct FailingConnection {
    inner: Arc<dyn DbConnection>,
    prefix: &'static str,
}

impl FailingConnection {
    pub fn new(inner: Arc<dyn DbConnection>, prefix: &'static str) -> Self {
        Self { inner, prefix }
    }
}

#[async_trait]
impl DbConnection for FailingConnection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dialect(&self) -> &DialectImpl {
        self.inner.dialect()
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.inner.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        if sql.starts_with(self.prefix) {
            return Err(MigrateError::Schema(format!("injected failure: {}", self.prefix)));
        }
        self.inner.execute(sql, params).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
