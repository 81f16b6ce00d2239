//! Configuration validation.

use serde_json::Value as JsonValue;

use super::{Config, MigrationConfig};
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};

/// Validate the file configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.url.trim().is_empty() {
        return Err(MigrateError::Config("source.url is required".into()));
    }
    if let Some(archive) = &config.archive {
        if archive.url.trim().is_empty() {
            return Err(MigrateError::Config(
                "archive.url cannot be empty (omit the section to reuse the source)".into(),
            ));
        }
    }

    // The table may still be supplied on the command line.
    if config.migration.table.is_some() {
        config.migration.resolve()?;
    }
    Ok(())
}

/// Validate a resolved migration configuration.
pub fn validate_migration(config: &MigrationConfig) -> Result<()> {
    for name in [
        &config.schema,
        &config.table,
        &config.archive_schema,
        &config.archive_table,
        &config.soft_delete_column,
        &config.payload_column,
    ] {
        validate_identifier(name)?;
    }

    if let Some(pk) = &config.primary_key {
        for column in pk.columns() {
            validate_identifier(column)?;
        }
        if pk.contains(&config.soft_delete_column) {
            return Err(MigrateError::Config(format!(
                "soft delete column {} cannot be part of the primary key",
                config.soft_delete_column
            )));
        }
    }

    if config.soft_delete_column == config.payload_column {
        return Err(MigrateError::Config(
            "migration.payload_column must differ from migration.soft_delete_column".into(),
        ));
    }

    if config.condition.trim().is_empty() {
        return Err(MigrateError::Config(
            "migration.condition cannot be empty (use 1=1 to match every row)".into(),
        ));
    }

    for (idx, param) in config.condition_params.iter().enumerate() {
        if matches!(param, JsonValue::Array(_) | JsonValue::Object(_)) {
            return Err(MigrateError::Config(format!(
                "migration.condition_params[{}] must be a scalar",
                idx
            )));
        }
    }

    if let Some(audit) = &config.audit {
        if audit.source_path == audit.archive_path {
            return Err(MigrateError::Config(
                "audit.source_path and audit.archive_path must differ".into(),
            ));
        }
    }

    Ok(())
}
