//! Core abstractions shared by the drivers and the orchestrator.
//!
//! - [`schema`]: table, column and primary-key metadata
//! - [`value`]: owned SQL values and rows
//! - [`statement`]: generated statements and the roles they target
//! - [`traits`]: the connection and dialect traits drivers implement
//! - [`identifier`]: identifier validation and quoting
//!
//! The core module defines engine-agnostic abstractions that are implemented
//! by driver modules (`drivers/mysql`, `drivers/sqlite`), so orchestration
//! logic can be tested against any connection implementation.

pub mod identifier;
pub mod schema;
pub mod statement;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use schema::{ArchiveTableSpec, ColumnDef, PrimaryKeySet, SourceTable};
pub use statement::{BoundStatement, ConnectionRole, GeneratedStatement, StatementKind};
pub use traits::{DbConnection, Dialect, QueryOutcome};
pub use value::{Row, SqlValue};
