//! Error types for the archive migration library.

use thiserror::Error;

use crate::core::{ConnectionRole, StatementKind};

/// Main error type for archive operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing table, zero batch size, bad identifier, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection belongs to an engine this library has no adapter for.
    #[error("Unsupported database engine: {0}")]
    UnsupportedEngine(String),

    /// Driver-level failure with context about what was being attempted.
    #[error("Database error while {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// A statement was issued on a connection that has already been closed.
    #[error("Connection {0} is closed")]
    ConnectionClosed(String),

    /// The source table does not exist (no column metadata was found).
    #[error("Source table {0} not found")]
    SourceTableMissing(String),

    /// The source table declares no primary key, so rows cannot be identified for deletion.
    #[error("Table {0} has no primary key - rows cannot be matched for deletion")]
    NoPrimaryKey(String),

    /// Row or metadata shape does not match what the migration needs.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A batch statement failed during the apply phase.
    #[error("{kind} batch {batch} failed on {role} connection: {source}")]
    BatchExecution {
        role: ConnectionRole,
        kind: StatementKind,
        batch: usize,
        #[source]
        source: Box<MigrateError>,
    },

    /// BEGIN or COMMIT failed.
    #[error("Transaction error on {role} connection: {message}")]
    Transaction {
        role: ConnectionRole,
        message: String,
    },

    /// IO error (audit files, config file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exit codes used by the CLI.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_CONNECTION_ERROR: u8 = 2;
pub const EXIT_SCHEMA_ERROR: u8 = 3;
pub const EXIT_EXECUTION_ERROR: u8 = 4;
pub const EXIT_TRANSACTION_ERROR: u8 = 5;
pub const EXIT_IO_ERROR: u8 = 7;

impl MigrateError {
    /// Create a Database error with context about where it occurred
    pub fn database(source: sqlx::Error, context: impl Into<String>) -> Self {
        MigrateError::Database {
            context: context.into(),
            source,
        }
    }

    /// Create a Transaction error
    pub fn transaction(role: ConnectionRole, message: impl Into<String>) -> Self {
        MigrateError::Transaction {
            role,
            message: message.into(),
        }
    }

    /// Wrap a statement failure with the batch it belongs to.
    pub fn batch(role: ConnectionRole, kind: StatementKind, batch: usize, source: MigrateError) -> Self {
        MigrateError::BatchExecution {
            role,
            kind,
            batch,
            source: Box::new(source),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::UnsupportedEngine(_)
            | MigrateError::Database { .. }
            | MigrateError::ConnectionClosed(_) => EXIT_CONNECTION_ERROR,
            MigrateError::SourceTableMissing(_)
            | MigrateError::NoPrimaryKey(_)
            | MigrateError::Schema(_) => EXIT_SCHEMA_ERROR,
            MigrateError::BatchExecution { .. } => EXIT_EXECUTION_ERROR,
            MigrateError::Transaction { .. } => EXIT_TRANSACTION_ERROR,
            MigrateError::Io(_) | MigrateError::Json(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_keeps_original_as_source() {
        let err = MigrateError::batch(
            ConnectionRole::Source,
            StatementKind::Delete,
            3,
            MigrateError::Schema("boom".into()),
        );
        let detailed = err.format_detailed();
        assert!(detailed.contains("DELETE batch 3 failed on source connection"));
        assert!(detailed.contains("Caused by"));
        assert!(detailed.contains("boom"));
        assert_eq!(err.exit_code(), EXIT_EXECUTION_ERROR);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::NoPrimaryKey("t".into()).exit_code(),
            EXIT_SCHEMA_ERROR
        );
        assert_eq!(
            MigrateError::transaction(ConnectionRole::Archive, "x").exit_code(),
            EXIT_TRANSACTION_ERROR
        );
    }
}
