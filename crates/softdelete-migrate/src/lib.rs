//! # softdelete-migrate
//!
//! Moves soft-deleted rows out of a live table into an archive table.
//!
//! Rows whose soft-delete timestamp is set are selected, copied into the
//! archive (key columns, the timestamp and a JSON payload with every other
//! field) and deleted from the source, all inside one transaction per
//! connection. Supported engines:
//!
//! - **MySQL / MariaDB** via `mysql://` and `mariadb://` URLs
//! - **SQLite** via `sqlite:` URLs
//!
//! The archive may live on the same connection as the source or on a second
//! one, possibly of the other engine. A dry-run mode generates every
//! statement without executing writes, and optional audit scripts record the
//! exact SQL for replay.
//!
//! ## Example
//!
//! ```rust,no_run
//! use softdelete_migrate::{drivers, migrate, MigrationOptions};
//!
//! #[tokio::main]
//! async fn main() -> softdelete_migrate::Result<()> {
//!     let source = drivers::connect("sqlite://app.db").await?;
//!     let mut options = MigrationOptions::for_table("users");
//!     options.batch_size = Some(500);
//!     let result = migrate(source, &options, None).await?;
//!     println!("Archived {} rows", result.rows_archived);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod introspect;
pub mod orchestrator;
pub mod plan;
pub mod provision;
pub mod transaction;

// Re-exports for convenient access
pub use crate::core::{
    ConnectionRole, DbConnection, Dialect, GeneratedStatement, PrimaryKeySet, Row, SourceTable,
    SqlValue, StatementKind,
};
pub use config::{AuditPaths, Config, ConnectionConfig, MigrationConfig, MigrationOptions};
pub use drivers::{connect, DialectImpl};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    migrate, BatchEvent, BatchObserver, BatchReport, BatchStatus, ErrorAction, Inspection,
    MigrationResult, Orchestrator, RunStatus,
};
pub use transaction::{TransactionCoordinator, TransactionState};
