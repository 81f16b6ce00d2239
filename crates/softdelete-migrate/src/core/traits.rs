//! Core traits for moving soft-deleted rows between connections.
//!
//! - [`DbConnection`]: a caller-owned connection that runs parameterized SQL
//! - [`Dialect`]: SQL syntax strategy for one engine
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` implementations provide interchangeable syntax rules
//! - **Template Method**: `DbConnection::run` routes to `query`/`execute`

use async_trait::async_trait;

use crate::drivers::DialectImpl;
use crate::error::Result;

use super::identifier::hex_literal;
use super::statement::BoundStatement;
use super::value::{Row, SqlValue};

/// Outcome of [`DbConnection::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Rows returned by a read statement.
    Rows(Vec<Row>),
    /// Affected-row count of a write statement.
    Affected(u64),
}

impl QueryOutcome {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutcome::Rows(rows) => rows,
            QueryOutcome::Affected(_) => Vec::new(),
        }
    }
}

/// A live database connection.
///
/// The connection is owned by the caller and outlives a migration call.
/// Implementations must run every statement on the same underlying session
/// so that `BEGIN`/`COMMIT` bracket all batch statements.
#[async_trait]
pub trait DbConnection: Send + Sync {
    /// Human-readable name used in logs (e.g. `sqlite::memory:`).
    fn name(&self) -> &str;

    /// SQL dialect of the engine behind this connection.
    fn dialect(&self) -> &DialectImpl;

    /// Run a statement that returns rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run a statement that modifies data, returning the affected-row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Close the connection. Later calls fail.
    async fn close(&self) -> Result<()>;

    /// Run a statement, routing by its leading keyword.
    ///
    /// Statements starting with `SELECT` or `PRAGMA` (case-insensitive) are
    /// treated as reads; everything else is a write. Statements that open
    /// with a comment or a `WITH` clause are misrouted, so callers that know
    /// the statement kind should call `query`/`execute` directly.
    async fn run(&self, sql: &str, params: &[SqlValue]) -> Result<QueryOutcome> {
        if is_read_statement(sql) {
            Ok(QueryOutcome::Rows(self.query(sql, params).await?))
        } else {
            Ok(QueryOutcome::Affected(self.execute(sql, params).await?))
        }
    }
}

/// Prefix check used by [`DbConnection::run`].
pub fn is_read_statement(sql: &str) -> bool {
    let head = sql.trim_start();
    ["SELECT", "PRAGMA"].iter().any(|kw| {
        head.len() >= kw.len() && head[..kw.len()].eq_ignore_ascii_case(kw)
    })
}

/// SQL syntax strategy for different database engines.
///
/// Provides engine-specific SQL generation while keeping the orchestration
/// logic engine-agnostic.
///
/// # Static dispatch
///
/// The `DialectImpl` enum in the `drivers` module implements this trait by
/// matching on its variants instead of going through a vtable.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mysql", "sqlite").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    ///
    /// - MySQL: `` `identifier` ``
    /// - SQLite: `"identifier"`
    fn quote_ident(&self, name: &str) -> String;

    /// Render a table reference. Engines without schemas ignore `schema`.
    fn qualify_table(&self, schema: &str, table: &str) -> String;

    /// Keyword that opens a transaction.
    fn transaction_begin_keyword(&self) -> &'static str;

    /// Whether DDL ends the open transaction (MySQL commits implicitly).
    fn ddl_commits_transaction(&self) -> bool {
        false
    }

    /// Column type used for the archived soft-delete timestamp.
    fn timestamp_column_type(&self) -> &'static str;

    /// Render a key column type copied from the source table.
    fn column_type(&self, source_type: &str) -> String {
        source_type.trim().to_string()
    }

    /// Column type of the JSON payload column.
    fn json_column_type(&self) -> &'static str {
        "JSON"
    }

    /// Parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Maximum number of bind parameters per statement.
    fn max_bind_params(&self) -> usize;

    /// Render a string literal with quotes escaped.
    fn quote_string(&self, value: &str) -> String;

    /// Render any value as an SQL literal, for audit scripts and oversized
    /// statements.
    fn render_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::U64(v) => v.to_string(),
            SqlValue::F64(v) if v.is_finite() => v.to_string(),
            SqlValue::F64(_) => "NULL".to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Bytes(v) => match std::str::from_utf8(v) {
                Ok(s) => self.quote_string(s),
                Err(_) => hex_literal(v),
            },
            SqlValue::Text(v) => self.quote_string(v),
            SqlValue::Date(v) => self.quote_string(&v.format("%Y-%m-%d").to_string()),
            SqlValue::Time(v) => self.quote_string(&v.format("%H:%M:%S%.f").to_string()),
            SqlValue::DateTime(v) => {
                self.quote_string(&v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            SqlValue::DateTimeUtc(v) => {
                self.quote_string(&v.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            SqlValue::Json(v) => self.quote_string(&v.to_string()),
        }
    }

    /// `WHERE` predicate matching rows whose key tuple is in `tuples`.
    ///
    /// Each tuple holds one already-rendered item (literal or placeholder)
    /// per key column.
    fn key_in_clause(&self, key_columns: &[String], tuples: &[Vec<String>]) -> String;

    /// Query returning one row with a single count column, non-zero when
    /// the table exists.
    fn table_exists_query(&self, schema: &str, table: &str) -> BoundStatement;
}
