//! SQLite database driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy
//! - [`SqliteConnection`]: single-connection adapter
//!
//! # Connection String
//!
//! ```text
//! sqlite://path/to/file.db
//! sqlite::memory:
//! ```

mod connection;
mod dialect;

pub use connection::SqliteConnection;
pub use dialect::SqliteDialect;
