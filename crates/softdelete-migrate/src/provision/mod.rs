//! Archive table provisioning.
//!
//! The archive table keeps the source key columns (types copied verbatim),
//! the soft-delete timestamp and a JSON payload with every other field.
//! No key constraint is declared on the archive, and column defaults are not
//! copied since archive rows always carry explicit key values.

use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::core::schema::{ArchiveTableSpec, SourceTable};
use crate::core::statement::{ConnectionRole, GeneratedStatement, StatementKind};
use crate::core::traits::{DbConnection, Dialect};
use crate::drivers::DialectImpl;
use crate::error::{MigrateError, Result};

/// Derive the archive table shape from the source table.
pub fn archive_spec(
    source: &SourceTable,
    config: &MigrationConfig,
    archive_dialect: &DialectImpl,
) -> Result<ArchiveTableSpec> {
    let key_columns = source.pk_columns()?.into_iter().cloned().collect();

    Ok(ArchiveTableSpec {
        schema: config.archive_schema.clone(),
        name: config.archive_table.clone(),
        key_columns,
        soft_delete_column: config.soft_delete_column.clone(),
        soft_delete_type: archive_dialect.timestamp_column_type().to_string(),
        payload_column: config.payload_column.clone(),
    })
}

/// Render `CREATE TABLE IF NOT EXISTS` for the archive table.
pub fn create_table_statement(spec: &ArchiveTableSpec, dialect: &DialectImpl) -> GeneratedStatement {
    let mut defs: Vec<String> = spec
        .key_columns
        .iter()
        .map(|col| {
            let mut def = dialect.quote_ident(&col.name);
            let data_type = dialect.column_type(&col.data_type);
            if !data_type.is_empty() {
                def.push(' ');
                def.push_str(&data_type);
            }
            if !col.is_nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();

    defs.push(format!(
        "{} {}",
        dialect.quote_ident(&spec.soft_delete_column),
        spec.soft_delete_type
    ));
    defs.push(format!(
        "{} {} NULL",
        dialect.quote_ident(&spec.payload_column),
        dialect.json_column_type()
    ));

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        dialect.qualify_table(&spec.schema, &spec.name),
        defs.join(", ")
    );

    GeneratedStatement::unbound(ConnectionRole::Archive, StatementKind::Create, sql)
}

/// Check whether `schema.table` exists on `conn`.
pub async fn table_exists(conn: &dyn DbConnection, schema: &str, table: &str) -> Result<bool> {
    let query = conn.dialect().table_exists_query(schema, table);
    let rows = conn.query(&query.sql, &query.params).await?;
    let count = rows
        .first()
        .and_then(|row| row.get("table_count"))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| MigrateError::Schema("table existence query returned no count".into()))?;
    Ok(count > 0)
}

/// Result of [`ensure_archive_table`].
#[derive(Debug, Clone)]
pub struct Provisioned {
    /// The CREATE statement, when the table was missing.
    pub statement: Option<GeneratedStatement>,
    /// Whether the statement was executed (false in dry run).
    pub created: bool,
}

/// Create the archive table when missing.
///
/// In dry-run mode the CREATE statement is generated and returned but never
/// executed.
pub async fn ensure_archive_table(
    archive: &dyn DbConnection,
    source: &SourceTable,
    config: &MigrationConfig,
) -> Result<Provisioned> {
    if table_exists(archive, &config.archive_schema, &config.archive_table).await? {
        debug!(
            "Archive table {}.{} already exists",
            config.archive_schema, config.archive_table
        );
        return Ok(Provisioned {
            statement: None,
            created: false,
        });
    }

    let spec = archive_spec(source, config, archive.dialect())?;
    let statement = create_table_statement(&spec, archive.dialect());

    if config.dry_run {
        info!(
            "Dry run: archive table {}.{} would be created",
            spec.schema, spec.name
        );
        return Ok(Provisioned {
            statement: Some(statement),
            created: false,
        });
    }

    archive
        .execute(&statement.bound.sql, &statement.bound.params)
        .await?;
    info!("Created archive table {}.{}", spec.schema, spec.name);

    Ok(Provisioned {
        statement: Some(statement),
        created: true,
    })
}
