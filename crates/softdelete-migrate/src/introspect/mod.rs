//! Runtime discovery of source table columns and primary key.
//!
//! MySQL metadata comes from `INFORMATION_SCHEMA`; SQLite metadata from
//! `PRAGMA table_info`. Both produce a [`SourceTable`] with columns in
//! ordinal order and the primary key in key order.

use tracing::debug;

use crate::core::schema::{ColumnDef, PrimaryKeySet, SourceTable};
use crate::core::traits::{DbConnection, Dialect};
use crate::core::value::{Row, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{MigrateError, Result};

/// Discover the columns and primary key of `schema.table`.
///
/// When `explicit_key` is given it replaces the discovered key, after
/// checking that every named column exists.
///
/// # Errors
///
/// - `SourceTableMissing` when no columns are reported
/// - `NoPrimaryKey` when the table declares no key and none is given
/// - `Schema` when an explicit key names an unknown column
pub async fn discover_table(
    conn: &dyn DbConnection,
    schema: &str,
    table: &str,
    explicit_key: Option<&PrimaryKeySet>,
) -> Result<SourceTable> {
    let (columns, discovered_key) = match conn.dialect() {
        DialectImpl::Mysql(_) => load_mysql(conn, schema, table).await?,
        DialectImpl::Sqlite(_) => load_sqlite(conn, table).await?,
    };

    if columns.is_empty() {
        return Err(MigrateError::SourceTableMissing(format!("{}.{}", schema, table)));
    }

    let primary_key = match explicit_key {
        Some(key) => {
            for name in key.columns() {
                if !columns.iter().any(|c| &c.name == name) {
                    return Err(MigrateError::Schema(format!(
                        "primary_key column {} does not exist in {}.{}",
                        name, schema, table
                    )));
                }
            }
            key.clone()
        }
        None => PrimaryKeySet::new(&format!("{}.{}", schema, table), discovered_key)?,
    };

    debug!(
        "Discovered {}.{}: {} columns, primary key ({})",
        schema,
        table,
        columns.len(),
        primary_key.columns().join(", ")
    );

    Ok(SourceTable {
        schema: schema.to_string(),
        name: table.to_string(),
        columns,
        primary_key,
    })
}

/// Convenience wrapper returning only the key.
pub async fn discover_primary_key(
    conn: &dyn DbConnection,
    schema: &str,
    table: &str,
) -> Result<PrimaryKeySet> {
    Ok(discover_table(conn, schema, table, None).await?.primary_key)
}

// CAST to CHAR to avoid binary-collation results on some servers. No length,
// so long enum/set types are not truncated.
const MYSQL_COLUMNS_QUERY: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR) AS column_name,
        CAST(COLUMN_TYPE AS CHAR) AS column_type,
        IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
        CAST(ORDINAL_POSITION AS SIGNED) AS ordinal_position
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const MYSQL_KEY_QUERY: &str = r#"
    SELECT CAST(COLUMN_NAME AS CHAR) AS column_name
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
    ORDER BY ORDINAL_POSITION
"#;

async fn load_mysql(
    conn: &dyn DbConnection,
    schema: &str,
    table: &str,
) -> Result<(Vec<ColumnDef>, Vec<String>)> {
    let params = [SqlValue::from(schema), SqlValue::from(table)];

    let columns = conn
        .query(MYSQL_COLUMNS_QUERY, &params)
        .await?
        .iter()
        .map(|row| {
            Ok(ColumnDef {
                name: text(row, "column_name")?,
                data_type: text(row, "column_type")?,
                is_nullable: int(row, "is_nullable")? == 1,
                ordinal_pos: int(row, "ordinal_position")? as i32,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let key = conn
        .query(MYSQL_KEY_QUERY, &params)
        .await?
        .iter()
        .map(|row| text(row, "column_name"))
        .collect::<Result<Vec<_>>>()?;

    Ok((columns, key))
}

async fn load_sqlite(conn: &dyn DbConnection, table: &str) -> Result<(Vec<ColumnDef>, Vec<String>)> {
    // PRAGMA arguments cannot be bound
    let sql = format!("PRAGMA table_info({})", conn.dialect().quote_ident(table));
    let rows = conn.query(&sql, &[]).await?;

    let mut columns = Vec::with_capacity(rows.len());
    let mut key: Vec<(i64, String)> = Vec::new();

    for row in &rows {
        let name = text(row, "name")?;
        let pk_position = int(row, "pk")?;
        if pk_position > 0 {
            key.push((pk_position, name.clone()));
        }
        columns.push(ColumnDef {
            name,
            data_type: text(row, "type")?,
            is_nullable: int(row, "notnull")? == 0,
            ordinal_pos: int(row, "cid")? as i32 + 1,
        });
    }

    key.sort_by_key(|(pos, _)| *pos);
    Ok((columns, key.into_iter().map(|(_, name)| name).collect()))
}

fn text(row: &Row, column: &str) -> Result<String> {
    row.get(column)
        .and_then(SqlValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| MigrateError::Schema(format!("metadata column {} missing or not text", column)))
}

fn int(row: &Row, column: &str) -> Result<i64> {
    row.get(column)
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| {
            MigrateError::Schema(format!("metadata column {} missing or not an integer", column))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::SqliteConnection;

    #[test]
    fn test_mysql_metadata_casts_have_no_length() {
        for query in [MYSQL_COLUMNS_QUERY, MYSQL_KEY_QUERY] {
            assert!(query.contains("AS CHAR)"));
            assert!(!query.contains("CHAR("));
        }
    }

    async fn sqlite_with(ddl: &str) -> SqliteConnection {
        let conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.execute(ddl, &[]).await.unwrap();
        conn
    }

    #[tokio::test]
    async fn test_single_key() {
        let conn = sqlite_with(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, deleted_at TEXT)",
        )
        .await;
        let table = discover_table(&conn, "main", "users", None).await.unwrap();
        assert_eq!(table.primary_key.columns(), ["id".to_string()]);
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[1].data_type, "TEXT");
        assert!(!table.columns[1].is_nullable);
        assert_eq!(table.columns[2].ordinal_pos, 3);
    }

    #[tokio::test]
    async fn test_composite_key_keeps_key_order() {
        let conn = sqlite_with(
            "CREATE TABLE memberships (user_id INTEGER, org_id INTEGER, deleted_at TEXT, \
             PRIMARY KEY (org_id, user_id))",
        )
        .await;
        let key = discover_primary_key(&conn, "main", "memberships").await.unwrap();
        assert_eq!(key.columns(), ["org_id".to_string(), "user_id".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let err = discover_table(&conn, "main", "nope", None).await.unwrap_err();
        assert!(matches!(err, MigrateError::SourceTableMissing(_)));
    }

    #[tokio::test]
    async fn test_no_primary_key() {
        let conn = sqlite_with("CREATE TABLE logs (msg TEXT, deleted_at TEXT)").await;
        let err = discover_table(&conn, "main", "logs", None).await.unwrap_err();
        assert!(matches!(err, MigrateError::NoPrimaryKey(_)));
    }

    #[tokio::test]
    async fn test_explicit_key_overrides_and_is_checked() {
        let conn = sqlite_with("CREATE TABLE logs (msg TEXT, deleted_at TEXT)").await;
        let key = PrimaryKeySet::new("logs", vec!["msg".into()]).unwrap();
        let table = discover_table(&conn, "main", "logs", Some(&key)).await.unwrap();
        assert_eq!(table.primary_key, key);

        let bad = PrimaryKeySet::new("logs", vec!["id".into()]).unwrap();
        let err = discover_table(&conn, "main", "logs", Some(&bad)).await.unwrap_err();
        assert!(matches!(err, MigrateError::Schema(_)));
    }
}
