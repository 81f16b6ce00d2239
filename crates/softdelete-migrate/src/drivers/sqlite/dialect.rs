//! SQLite SQL dialect.

use crate::core::identifier::{escape_string_sqlite, quote_sqlite};
use crate::core::statement::BoundStatement;
use crate::core::traits::Dialect;
use crate::core::value::SqlValue;

/// `SQLITE_MAX_VARIABLE_NUMBER` default since 3.32.
const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

/// SQLite dialect implementation.
///
/// SQLite has no schemas in the MySQL sense, so table references are never
/// qualified and the configured schema name is ignored.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_sqlite(name)
    }

    fn qualify_table(&self, _schema: &str, table: &str) -> String {
        quote_sqlite(table)
    }

    fn transaction_begin_keyword(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn timestamp_column_type(&self) -> &'static str {
        "INTEGER"
    }

    /// SQLite type names are words followed by at most one numeric
    /// argument list, so `int(10) unsigned` becomes `int unsigned(10)` and
    /// non-numeric arguments such as `enum('a','b')` are dropped.
    fn column_type(&self, source_type: &str) -> String {
        let mut words = String::new();
        let mut args = String::new();
        let mut depth = 0usize;
        for ch in source_type.trim().chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if depth > 0 => args.push(c),
                c if c.is_ascii_alphanumeric() || c == '_' => words.push(c),
                _ => words.push(' '),
            }
        }

        let name = words.split_whitespace().collect::<Vec<_>>().join(" ");
        let numeric = !args.trim().is_empty()
            && args
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ',' | ' ' | '+' | '-'));
        match (name.is_empty(), numeric) {
            (true, _) => String::new(),
            (false, true) => format!("{}({})", name, args.replace(' ', "")),
            (false, false) => name,
        }
    }

    fn max_bind_params(&self) -> usize {
        SQLITE_MAX_BIND_PARAMS
    }

    fn quote_string(&self, value: &str) -> String {
        escape_string_sqlite(value)
    }

    // SQLite only accepts a subquery on the right of a row-value IN.
    fn key_in_clause(&self, key_columns: &[String], tuples: &[Vec<String>]) -> String {
        if key_columns.len() == 1 {
            let items: Vec<String> = tuples.iter().map(|t| t.join(", ")).collect();
            return format!(
                "{} IN ({})",
                self.quote_ident(&key_columns[0]),
                items.join(", ")
            );
        }

        let cols = key_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = tuples
            .iter()
            .map(|t| format!("({})", t.join(", ")))
            .collect::<Vec<_>>()
            .join(", ");
        format!("({}) IN (VALUES {})", cols, rows)
    }

    fn table_exists_query(&self, _schema: &str, table: &str) -> BoundStatement {
        BoundStatement {
            sql: "SELECT COUNT(*) AS table_count FROM sqlite_master \
                  WHERE type = 'table' AND name = ?"
                .to_string(),
            params: vec![SqlValue::from(table)],
        }
    }
}
