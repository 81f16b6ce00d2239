//! INSERT/DELETE generation for planned batches.
//!
//! Every statement is rendered twice: once with literal values for the
//! audit scripts and once with `?` placeholders plus bound values for
//! execution. When a statement would exceed the dialect's bind-parameter
//! limit the literal form is executed instead.

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::config::MigrationConfig;
use crate::core::schema::PrimaryKeySet;
use crate::core::statement::{BoundStatement, ConnectionRole, GeneratedStatement, StatementKind};
use crate::core::traits::Dialect;
use crate::core::value::{Row, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{MigrateError, Result};

use super::Batch;

/// Query selecting the rows to move, with the caller's condition parameters bound.
pub fn select_eligible(config: &MigrationConfig, dialect: &DialectImpl) -> BoundStatement {
    let sql = format!(
        "SELECT * FROM {} WHERE {} IS NOT NULL AND ({}) LIMIT {}",
        dialect.qualify_table(&config.schema, &config.table),
        dialect.quote_ident(&config.soft_delete_column),
        config.condition,
        config.limit
    );
    let params = config
        .condition_params
        .iter()
        .map(SqlValue::from_json)
        .collect();
    BoundStatement { sql, params }
}

/// Statements for every batch, in batch order.
#[derive(Debug, Clone, Default)]
pub struct StatementSet {
    /// Archive-side INSERTs.
    pub inserts: Vec<GeneratedStatement>,
    /// Source-side DELETEs.
    pub deletes: Vec<GeneratedStatement>,
}

impl StatementSet {
    /// Total number of write statements (INSERTs and DELETEs).
    pub fn len(&self) -> usize {
        self.inserts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// Renders the per-batch INSERT (archive dialect) and DELETE (source dialect).
pub struct StatementGenerator<'a> {
    config: &'a MigrationConfig,
    primary_key: &'a PrimaryKeySet,
    source_dialect: &'a DialectImpl,
    archive_dialect: &'a DialectImpl,
}

impl<'a> StatementGenerator<'a> {
    pub fn new(
        config: &'a MigrationConfig,
        primary_key: &'a PrimaryKeySet,
        source_dialect: &'a DialectImpl,
        archive_dialect: &'a DialectImpl,
    ) -> Self {
        Self {
            config,
            primary_key,
            source_dialect,
            archive_dialect,
        }
    }

    /// Generate the INSERT and DELETE for every batch.
    pub fn generate(&self, batches: &[Batch]) -> Result<StatementSet> {
        let mut set = StatementSet {
            inserts: Vec::with_capacity(batches.len()),
            deletes: Vec::with_capacity(batches.len()),
        };
        for batch in batches {
            set.inserts.push(self.insert_statement(batch)?);
            set.deletes.push(self.delete_statement(batch)?);
        }
        Ok(set)
    }

    /// `DELETE FROM <source> WHERE <key> IN (<batch keys>)`.
    pub fn delete_statement(&self, batch: &Batch) -> Result<GeneratedStatement> {
        let dialect = self.source_dialect;
        let key_columns = self.primary_key.columns();

        let mut literal_tuples: Vec<Vec<String>> = Vec::with_capacity(batch.len());
        let mut bound_tuples: Vec<Vec<String>> = Vec::with_capacity(batch.len());
        let mut params = Vec::with_capacity(batch.len() * key_columns.len());

        for row in &batch.rows {
            let keys = self.key_values(row)?;
            literal_tuples.push(keys.iter().map(|v| dialect.render_literal(v)).collect());
            bound_tuples.push(placeholders(dialect, params.len(), keys.len()));
            params.extend(keys.into_iter().cloned());
        }

        let table = dialect.qualify_table(&self.config.schema, &self.config.table);
        let literal = format!(
            "DELETE FROM {} WHERE {}",
            table,
            dialect.key_in_clause(key_columns, &literal_tuples)
        );
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            table,
            dialect.key_in_clause(key_columns, &bound_tuples)
        );

        Ok(self.finish(
            ConnectionRole::Source,
            StatementKind::Delete,
            batch,
            literal,
            BoundStatement { sql, params },
        ))
    }

    /// `INSERT INTO <archive> (<key>, <soft delete>, <payload>) VALUES ...`.
    pub fn insert_statement(&self, batch: &Batch) -> Result<GeneratedStatement> {
        let dialect = self.archive_dialect;
        let key_columns = self.primary_key.columns();

        let columns = key_columns
            .iter()
            .chain([&self.config.soft_delete_column, &self.config.payload_column])
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut literal_rows = Vec::with_capacity(batch.len());
        let mut bound_rows = Vec::with_capacity(batch.len());
        let mut params = Vec::with_capacity(batch.len() * (key_columns.len() + 2));

        for row in &batch.rows {
            let mut values: Vec<SqlValue> = self.key_values(row)?.into_iter().cloned().collect();
            let deleted_at = row.get(&self.config.soft_delete_column).ok_or_else(|| {
                MigrateError::Schema(format!(
                    "row is missing soft delete column {}",
                    self.config.soft_delete_column
                ))
            })?;
            values.push(deleted_at.sanitize_timestamp());
            values.push(SqlValue::Text(self.payload(row).to_string()));

            literal_rows.push(format!(
                "({})",
                values
                    .iter()
                    .map(|v| dialect.render_literal(v))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
            bound_rows.push(format!(
                "({})",
                placeholders(dialect, params.len(), values.len()).join(", ")
            ));
            params.extend(values);
        }

        let table = dialect.qualify_table(&self.config.archive_schema, &self.config.archive_table);
        let literal = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns,
            literal_rows.join(", ")
        );
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns,
            bound_rows.join(", ")
        );

        Ok(self.finish(
            ConnectionRole::Archive,
            StatementKind::Insert,
            batch,
            literal,
            BoundStatement { sql, params },
        ))
    }

    fn key_values<'r>(&self, row: &'r Row) -> Result<Vec<&'r SqlValue>> {
        self.primary_key
            .columns()
            .iter()
            .map(|col| {
                row.get(col).ok_or_else(|| {
                    MigrateError::Schema(format!("row is missing primary key column {}", col))
                })
            })
            .collect()
    }

    /// JSON object of every non-key, non-soft-delete field, in column order.
    fn payload(&self, row: &Row) -> JsonValue {
        let mut map = Map::new();
        for (column, value) in row.iter() {
            let is_key = self
                .primary_key
                .columns()
                .iter()
                .any(|k| k.eq_ignore_ascii_case(column));
            if is_key || column.eq_ignore_ascii_case(&self.config.soft_delete_column) {
                continue;
            }
            map.insert(column.to_string(), value.to_json());
        }
        JsonValue::Object(map)
    }

    fn finish(
        &self,
        role: ConnectionRole,
        kind: StatementKind,
        batch: &Batch,
        literal: String,
        bound: BoundStatement,
    ) -> GeneratedStatement {
        let dialect = match role {
            ConnectionRole::Source => self.source_dialect,
            ConnectionRole::Archive => self.archive_dialect,
        };

        let bound = if bound.params.len() > dialect.max_bind_params() {
            debug!(
                "{} batch {} needs {} parameters (limit {}), executing literal SQL",
                kind,
                batch.index,
                bound.params.len(),
                dialect.max_bind_params()
            );
            BoundStatement {
                sql: literal.clone(),
                params: Vec::new(),
            }
        } else {
            bound
        };

        GeneratedStatement {
            role,
            kind,
            batch_index: Some(batch.index),
            rows: batch.len(),
            literal,
            bound,
        }
    }
}

fn placeholders(dialect: &DialectImpl, offset: usize, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| dialect.param_placeholder(offset + i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationOptions;
    use crate::drivers::{MysqlDialect, SqliteDialect};
    use chrono::NaiveDate;

    fn config() -> MigrationConfig {
        MigrationOptions {
            schema: Some("app".into()),
            table: Some("users".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    fn user(id: i64, name: &str) -> Row {
        let deleted = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        vec![
            ("id", SqlValue::I64(id)),
            ("name", SqlValue::from(name)),
            ("deleted_at", SqlValue::DateTime(deleted)),
        ]
        .into_iter()
        .collect()
    }

    fn batch(rows: Vec<Row>) -> Batch {
        Batch { index: 0, rows }
    }

    #[test]
    fn test_select_eligible() {
        let mut cfg = config();
        cfg.condition = "deleted_at < ?".into();
        cfg.condition_params = vec![serde_json::json!("2022-01-01")];
        cfg.limit = 500;

        let q = select_eligible(&cfg, &DialectImpl::Sqlite(SqliteDialect::new()));
        assert_eq!(
            q.sql,
            "SELECT * FROM \"users\" WHERE \"deleted_at\" IS NOT NULL AND (deleted_at < ?) LIMIT 500"
        );
        assert_eq!(q.params, vec![SqlValue::from("2022-01-01")]);

        let q = select_eligible(&cfg, &DialectImpl::Mysql(MysqlDialect::new()));
        assert!(q.sql.starts_with("SELECT * FROM `app`.`users` WHERE `deleted_at` IS NOT NULL"));
    }

    #[test]
    fn test_delete_matches_batch_keys() {
        let cfg = config();
        let pk = PrimaryKeySet::new("users", vec!["id".into()]).unwrap();
        let dialect = DialectImpl::Mysql(MysqlDialect::new());
        let generator = StatementGenerator::new(&cfg, &pk, &dialect, &dialect);

        let stmt = generator
            .delete_statement(&batch(vec![user(3, "a"), user(9, "b")]))
            .unwrap();
        assert_eq!(stmt.literal, "DELETE FROM `app`.`users` WHERE `id` IN (3, 9)");
        assert_eq!(stmt.bound.sql, "DELETE FROM `app`.`users` WHERE `id` IN (?, ?)");
        assert_eq!(stmt.bound.params, vec![SqlValue::I64(3), SqlValue::I64(9)]);
        assert_eq!(stmt.role, ConnectionRole::Source);
        assert_eq!(stmt.rows, 2);
    }

    #[test]
    fn test_insert_with_payload_and_sanitized_timestamp() {
        let cfg = config();
        let pk = PrimaryKeySet::new("users", vec!["id".into()]).unwrap();
        let source = DialectImpl::Mysql(MysqlDialect::new());
        let archive = DialectImpl::Sqlite(SqliteDialect::new());
        let generator = StatementGenerator::new(&cfg, &pk, &source, &archive);

        let stmt = generator
            .insert_statement(&batch(vec![user(1, "O'Neil")]))
            .unwrap();
        assert_eq!(
            stmt.literal,
            "INSERT INTO \"_users\" (\"id\", \"deleted_at\", \"data\") \
             VALUES (1, '2021-06-01 12:00:00', '{\"name\":\"O''Neil\"}')"
        );
        assert_eq!(
            stmt.bound.sql,
            "INSERT INTO \"_users\" (\"id\", \"deleted_at\", \"data\") VALUES (?, ?, ?)"
        );
        assert_eq!(
            stmt.bound.params,
            vec![
                SqlValue::I64(1),
                SqlValue::from("2021-06-01 12:00:00"),
                SqlValue::from(r#"{"name":"O'Neil"}"#),
            ]
        );
    }

    #[test]
    fn test_composite_key_on_sqlite() {
        let cfg = config();
        let pk = PrimaryKeySet::new("t", vec!["org".into(), "id".into()]).unwrap();
        let dialect = DialectImpl::Sqlite(SqliteDialect::new());
        let generator = StatementGenerator::new(&cfg, &pk, &dialect, &dialect);

        let row: Row = vec![
            ("org", SqlValue::from("acme")),
            ("id", SqlValue::I64(1)),
            ("deleted_at", SqlValue::from("2021-01-01")),
        ]
        .into_iter()
        .collect();
        let stmt = generator.delete_statement(&batch(vec![row])).unwrap();
        assert_eq!(
            stmt.literal,
            "DELETE FROM \"users\" WHERE (\"org\", \"id\") IN (VALUES ('acme', 1))"
        );

        let insert = generator.insert_statement(&batch(vec![])).unwrap();
        assert!(insert.bound.params.is_empty());
    }

    #[test]
    fn test_missing_key_column_is_schema_error() {
        let cfg = config();
        let pk = PrimaryKeySet::new("users", vec!["uuid".into()]).unwrap();
        let dialect = DialectImpl::Sqlite(SqliteDialect::new());
        let generator = StatementGenerator::new(&cfg, &pk, &dialect, &dialect);
        let err = generator
            .delete_statement(&batch(vec![user(1, "a")]))
            .unwrap_err();
        assert!(matches!(err, MigrateError::Schema(_)));
    }

    #[test]
    fn test_missing_soft_delete_column_is_schema_error() {
        let cfg = config();
        let pk = PrimaryKeySet::new("users", vec!["id".into()]).unwrap();
        let dialect = DialectImpl::Sqlite(SqliteDialect::new());
        let generator = StatementGenerator::new(&cfg, &pk, &dialect, &dialect);
        let row: Row = vec![("id", SqlValue::I64(1))].into_iter().collect();
        assert!(matches!(
            generator.insert_statement(&batch(vec![row])),
            Err(MigrateError::Schema(_))
        ));
    }

    #[test]
    fn test_generate_pairs_statements_per_batch() {
        let cfg = config();
        let pk = PrimaryKeySet::new("users", vec!["id".into()]).unwrap();
        let dialect = DialectImpl::Sqlite(SqliteDialect::new());
        let generator = StatementGenerator::new(&cfg, &pk, &dialect, &dialect);
        let batches = super::super::plan_batches(
            (0..25).map(|i| user(i, "x")).collect(),
            std::num::NonZeroUsize::new(10).unwrap(),
        );
        let set = generator.generate(&batches).unwrap();
        assert_eq!(set.inserts.len(), 3);
        assert_eq!(set.deletes.len(), 3);
        assert_eq!(set.len(), 6);
        assert!(!set.is_empty());
        assert!(StatementSet::default().is_empty());
        assert_eq!(set.deletes[2].batch_index, Some(2));
        assert_eq!(set.deletes[2].bound.params.len(), 5);
    }
}
