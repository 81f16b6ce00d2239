//! SQLite connection adapter.
//!
//! Wraps a single `sqlx` SQLite connection. Every statement runs on that one
//! connection, so a `BEGIN TRANSACTION` issued through [`DbConnection::execute`]
//! covers all later statements until `COMMIT`/`ROLLBACK`.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::traits::DbConnection;
use crate::core::value::{Row, SqlValue};
use crate::drivers::{redact_url, DialectImpl};
use crate::error::{MigrateError, Result};

use super::SqliteDialect;

/// A SQLite database behind one connection.
pub struct SqliteConnection {
    name: String,
    dialect: DialectImpl,
    conn: Mutex<Option<sqlx::SqliteConnection>>,
}

impl SqliteConnection {
    /// Open a connection from a URL such as `sqlite://data.db` or `sqlite::memory:`.
    ///
    /// File databases are created when missing. Each `sqlite::memory:`
    /// connection is its own private database.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MigrateError::database(e, "parsing SQLite connection URL"))?
            .create_if_missing(true);

        let conn = options
            .connect()
            .await
            .map_err(|e| MigrateError::database(e, "opening SQLite connection"))?;

        let name = redact_url(url);
        info!("Connected to SQLite: {}", name);

        Ok(Self {
            name,
            dialect: DialectImpl::Sqlite(SqliteDialect::new()),
            conn: Mutex::new(Some(conn)),
        })
    }

    fn closed(&self) -> MigrateError {
        MigrateError::ConnectionClosed(self.name.clone())
    }

    fn bind_value<'q>(
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
        value: &SqlValue,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::I64(v) => query.bind(*v),
            SqlValue::U64(v) => match i64::try_from(*v) {
                Ok(v) => query.bind(v),
                Err(_) => query.bind(v.to_string()),
            },
            SqlValue::F64(v) => query.bind(*v),
            // No native decimal storage class; keep the exact text.
            SqlValue::Decimal(v) => query.bind(v.to_string()),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bytes(v) => query.bind(v.clone()),
            SqlValue::Date(v) => query.bind(*v),
            SqlValue::Time(v) => query.bind(*v),
            SqlValue::DateTime(v) => query.bind(*v),
            SqlValue::DateTimeUtc(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.to_string()),
        }
    }

    /// Convert a SQLite row using the storage class of each value.
    fn convert_row(row: &SqliteRow) -> Result<Row> {
        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());

        for (idx, col) in row.columns().iter().enumerate() {
            columns.push(col.name().to_string());

            let storage = {
                let raw = row
                    .try_get_raw(idx)
                    .map_err(|e| MigrateError::database(e, "reading SQLite value"))?;
                if raw.is_null() {
                    None
                } else {
                    Some(raw.type_info().name().to_uppercase())
                }
            };

            let value = match storage.as_deref() {
                None | Some("NULL") => SqlValue::Null,
                Some("INTEGER") => row
                    .try_get_unchecked::<i64, _>(idx)
                    .map(SqlValue::I64)
                    .map_err(|e| MigrateError::database(e, "decoding SQLite INTEGER"))?,
                Some("REAL") => row
                    .try_get_unchecked::<f64, _>(idx)
                    .map(SqlValue::F64)
                    .map_err(|e| MigrateError::database(e, "decoding SQLite REAL"))?,
                Some("BLOB") => row
                    .try_get_unchecked::<Vec<u8>, _>(idx)
                    .map(SqlValue::Bytes)
                    .map_err(|e| MigrateError::database(e, "decoding SQLite BLOB"))?,
                _ => row
                    .try_get_unchecked::<String, _>(idx)
                    .map(SqlValue::Text)
                    .map_err(|e| MigrateError::database(e, "decoding SQLite TEXT"))?,
            };
            values.push(value);
        }

        Ok(Row::new(columns, values))
    }
}

#[async_trait]
impl DbConnection for SqliteConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        debug!("{}: {}", self.name, sql);
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| self.closed())?;

        let rows: Vec<SqliteRow> = if params.is_empty() {
            sqlx::Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for value in params {
                query = Self::bind_value(query, value);
            }
            query.fetch_all(&mut *conn).await
        }
        .map_err(|e| MigrateError::database(e, format!("querying {}", self.name)))?;

        rows.iter().map(Self::convert_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!("{}: {}", self.name, sql);
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| self.closed())?;

        let result = if params.is_empty() {
            sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for value in params {
                query = Self::bind_value(query, value);
            }
            query.execute(&mut *conn).await
        }
        .map_err(|e| MigrateError::database(e, format!("executing on {}", self.name)))?;

        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        match conn {
            Some(conn) => {
                conn.close()
                    .await
                    .map_err(|e| MigrateError::database(e, format!("closing {}", self.name)))?;
                info!("Closed {}", self.name);
                Ok(())
            }
            None => Err(self.closed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_decodes_storage_classes() {
        let conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let rows = conn
            .query(
                "SELECT 1 AS i, 2.5 AS r, 'x' AS t, X'00FF' AS b, NULL AS n",
                &[],
            )
            .await
            .unwrap();
        let row = &rows[0];
        assert_eq!(row.get("i"), Some(&SqlValue::I64(1)));
        assert_eq!(row.get("r"), Some(&SqlValue::F64(2.5)));
        assert_eq!(row.get("t"), Some(&SqlValue::from("x")));
        assert_eq!(row.get("b"), Some(&SqlValue::Bytes(vec![0x00, 0xff])));
        assert_eq!(row.get("n"), Some(&SqlValue::Null));
    }

    #[tokio::test]
    async fn test_execute_with_params_and_transaction() {
        let conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .await
            .unwrap();
        conn.execute("BEGIN TRANSACTION", &[]).await.unwrap();
        let affected = conn
            .execute(
                "INSERT INTO t (id, v) VALUES (?, ?), (?, ?)",
                &[1.into(), "a".into(), 2.into(), SqlValue::Null],
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);
        conn.execute("ROLLBACK", &[]).await.unwrap();

        let rows = conn.query("SELECT COUNT(*) AS c FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get("c"), Some(&SqlValue::I64(0)));
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_statements() {
        let conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.close().await.unwrap();
        let err = conn.query("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, MigrateError::ConnectionClosed(_)));
        assert!(conn.close().await.is_err());
    }
}
