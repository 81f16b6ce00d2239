//! Audit script writer.
//!
//! Produces two replayable SQL scripts: one for the source connection with
//! the DELETE statements and one for the archive connection with the CREATE
//! (when generated) and INSERT statements. Each script is wrapped in the
//! dialect's transaction keywords.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::AuditPaths;
use crate::core::statement::GeneratedStatement;
use crate::core::traits::Dialect;
use crate::drivers::DialectImpl;
use crate::error::Result;

/// Everything the two scripts contain.
pub struct AuditScripts<'a> {
    pub source_dialect: &'a DialectImpl,
    pub archive_dialect: &'a DialectImpl,
    /// CREATE TABLE for the archive, when one was generated.
    pub create: Option<&'a GeneratedStatement>,
    pub inserts: &'a [GeneratedStatement],
    pub deletes: &'a [GeneratedStatement],
    pub generated_at: DateTime<Utc>,
    /// Run fingerprint recorded in the header.
    pub fingerprint: &'a str,
}

fn header(generated_at: &DateTime<Utc>, fingerprint: &str) -> String {
    let mut out = String::new();
    out.push_str("-- Soft delete migration\n");
    out.push_str(&format!("-- Generated at {}\n", generated_at.to_rfc3339()));
    out.push_str(&format!("-- Configuration fingerprint {}\n", fingerprint));
    out.push_str("--\n");
    out.push_str(
        "-- This script will move all rows that have been soft deleted and move them into a new table.\n",
    );
    out.push_str("--\n");
    out.push_str(
        "-- To run this script, copy the contents of this file into a new file and run it against your database.\n",
    );
    out.push_str("--\n");
    out.push_str("-- This script will not delete any data. It will only move it.\n");
    out.push_str("--\n\n");
    out.push_str("-- Begin transaction\n");
    out
}

fn script<'s>(
    dialect: &DialectImpl,
    header: &str,
    section: &str,
    statements: impl Iterator<Item = &'s GeneratedStatement>,
) -> String {
    let mut out = String::from(header);
    out.push_str(dialect.transaction_begin_keyword());
    out.push_str(";\n\n");
    out.push_str(section);
    out.push_str("\n\n");
    for statement in statements {
        out.push_str(&statement.literal);
        out.push_str(";\n");
    }
    out.push_str("\n-- Commit transaction\n");
    out.push_str("COMMIT;\n");
    out
}

impl AuditScripts<'_> {
    /// Text of the source-side script.
    pub fn source_script(&self) -> String {
        script(
            self.source_dialect,
            &header(&self.generated_at, self.fingerprint),
            "-- Delete all rows that have been soft deleted from the original table",
            self.deletes.iter(),
        )
    }

    /// Text of the archive-side script.
    pub fn archive_script(&self) -> String {
        script(
            self.archive_dialect,
            &header(&self.generated_at, self.fingerprint),
            "-- Insert all rows that have been soft deleted into a new table",
            self.create.into_iter().chain(self.inserts.iter()),
        )
    }

    /// Write both scripts, replacing existing files.
    pub fn write(&self, paths: &AuditPaths) -> Result<()> {
        replace_file(&paths.source_path, &self.source_script())?;
        replace_file(&paths.archive_path, &self.archive_script())?;
        info!(
            "Wrote audit scripts {} and {}",
            paths.source_path.display(),
            paths.archive_path.display()
        );
        Ok(())
    }

    /// Write both scripts, logging instead of failing.
    ///
    /// Returns the error message when writing failed.
    pub fn write_logged(&self, paths: &AuditPaths) -> Option<String> {
        match self.write(paths) {
            Ok(()) => None,
            Err(e) => {
                warn!("Could not save audit scripts: {}", e);
                Some(e.to_string())
            }
        }
    }
}

fn replace_file(path: &Path, contents: &str) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::write(path, contents)?;
    Ok(())
}
