//! Table metadata discovered at runtime and the archive table derived from it.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Column metadata as reported by the source engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,

    /// Declared type, copied verbatim into the archive table
    /// (e.g. `int(10) unsigned`, `VARCHAR(64)`).
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

/// Ordered, non-empty list of primary key column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PrimaryKeySet(Vec<String>);

impl PrimaryKeySet {
    /// Build a key set. Fails when `columns` is empty.
    pub fn new(table: &str, columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(MigrateError::NoPrimaryKey(table.to_string()));
        }
        Ok(Self(columns))
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }

    /// Whether `column` is part of the key.
    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }
}

impl TryFrom<Vec<String>> for PrimaryKeySet {
    type Error = MigrateError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(MigrateError::Config(
                "primary_key must name at least one column".into(),
            ));
        }
        Ok(Self(columns))
    }
}

impl From<PrimaryKeySet> for Vec<String> {
    fn from(pk: PrimaryKeySet) -> Self {
        pk.0
    }
}

/// Source table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTable {
    /// Schema (database) name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<ColumnDef>,

    /// Primary key, in key order.
    pub primary_key: PrimaryKeySet,
}

impl SourceTable {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Look up a column by name (exact, then case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// Definitions of the key columns, in key order.
    pub fn pk_columns(&self) -> Result<Vec<&ColumnDef>> {
        self.primary_key
            .columns()
            .iter()
            .map(|name| {
                self.column(name).ok_or_else(|| {
                    MigrateError::Schema(format!(
                        "primary key column {} not found in {}",
                        name,
                        self.full_name()
                    ))
                })
            })
            .collect()
    }
}

/// Shape of the archive table: key columns, the soft-delete timestamp and a
/// JSON payload holding everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveTableSpec {
    pub schema: String,
    pub name: String,
    /// Key columns with types copied from the source.
    pub key_columns: Vec<ColumnDef>,
    pub soft_delete_column: String,
    /// Dialect timestamp type for the soft-delete column.
    pub soft_delete_type: String,
    pub payload_column: String,
}
