//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Provides MySQL-specific SQL syntax for identifier quoting, literals,
//! transaction control and key matching.

use crate::core::identifier::{escape_string_mysql, qualify_mysql, quote_mysql};
use crate::core::statement::BoundStatement;
use crate::core::traits::Dialect;
use crate::core::value::SqlValue;

/// Placeholder limit of the MySQL binary protocol (u16 parameter count).
const MYSQL_MAX_BIND_PARAMS: usize = 65_535;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mysql(name)
    }

    fn qualify_table(&self, schema: &str, table: &str) -> String {
        qualify_mysql(schema, table)
    }

    fn transaction_begin_keyword(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn ddl_commits_transaction(&self) -> bool {
        true
    }

    fn timestamp_column_type(&self) -> &'static str {
        "DATETIME"
    }

    fn max_bind_params(&self) -> usize {
        MYSQL_MAX_BIND_PARAMS
    }

    fn quote_string(&self, value: &str) -> String {
        escape_string_mysql(value)
    }

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
        format!("({}) IN ({})", cols, rows)
    }

    fn table_exists_query(&self, schema: &str, table: &str) -> BoundStatement {
        BoundStatement {
            sql: "SELECT COUNT(*) AS table_count FROM information_schema.tables \
                  WHERE table_schema = ? AND table_name = ?"
                .to_string(),
            params: vec![SqlValue::from(schema), SqlValue::from(table)],
        }
    }
}
