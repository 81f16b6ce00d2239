//! Identifier validation plus identifier and string-literal quoting.
//!
//! SQL identifiers (schema, table and column names) cannot be bound as
//! parameters, and the audit scripts embed every value as a literal. Both
//! kinds of text therefore go through this module before they reach SQL:
//!
//! 1. Identifiers are validated (non-empty, no NUL bytes, bounded length)
//! 2. Identifiers are quoted with the engine's quote character, doubling it
//! 3. String literals are wrapped in single quotes with embedded quotes
//!    doubled (and backslashes doubled for MySQL, which treats `\` as an
//!    escape character unless `NO_BACKSLASH_ESCAPES` is set)

use crate::error::{MigrateError, Result};

/// Maximum identifier length (conservative limit across engines).
/// - MySQL: 64 characters
/// - SQLite: unbounded
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `MigrateError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users"), "`users`");
/// assert_eq!(quote_mysql("table`name"), "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a SQLite identifier using double quotes.
pub fn quote_sqlite(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify a MySQL table name with its database.
pub fn qualify_mysql(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_mysql(schema), quote_mysql(table))
}

/// Render a MySQL string literal.
pub fn escape_string_mysql(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Render a SQLite string literal.
pub fn escape_string_sqlite(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render bytes as a hex blob literal (`X'0AFF'`), understood by both engines.
pub fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("X'");
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out.push('\'');
    out
}
