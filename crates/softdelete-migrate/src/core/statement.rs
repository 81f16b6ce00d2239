//! Statement vocabulary shared by the generator, the coordinator and the audit writer.

use serde::{Deserialize, Serialize};

use super::value::SqlValue;

/// Which side of the migration a statement targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    /// The live table rows are deleted from.
    Source,
    /// The connection holding the archive table.
    Archive,
}

impl std::fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionRole::Source => f.write_str("source"),
            ConnectionRole::Archive => f.write_str("archive"),
        }
    }
}

/// Kind of generated statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Create,
    Insert,
    Delete,
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatementKind::Create => f.write_str("CREATE"),
            StatementKind::Insert => f.write_str("INSERT"),
            StatementKind::Delete => f.write_str("DELETE"),
        }
    }
}

/// Placeholder SQL plus the values bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// A statement planned for one batch (or the archive DDL).
///
/// `literal` embeds every value and is what the audit scripts record;
/// `bound` is what gets executed.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedStatement {
    pub role: ConnectionRole,
    pub kind: StatementKind,
    /// Batch index, `None` for DDL.
    pub batch_index: Option<usize>,
    /// Number of source rows the statement covers.
    pub rows: usize,
    pub literal: String,
    pub bound: BoundStatement,
}

impl GeneratedStatement {
    /// A statement with no parameters (DDL).
    pub fn unbound(role: ConnectionRole, kind: StatementKind, sql: String) -> Self {
        Self {
            role,
            kind,
            batch_index: None,
            rows: 0,
            literal: sql.clone(),
            bound: BoundStatement {
                sql,
                params: Vec::new(),
            },
        }
    }
}
