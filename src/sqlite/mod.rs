// ABOUTME: SQLite source access for conversion to PostgreSQL
// ABOUTME: Provides secure file path validation and read-only database connections

pub mod reader;

pub use reader::SqliteReader;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Validate a SQLite file path to prevent path traversal attacks
///
/// Security checks:
/// - Canonicalizes path to resolve symlinks and relative paths
/// - Verifies file exists and is a regular file (not directory)
/// - Checks file extension is .db, .sqlite, or .sqlite3
///
/// # Returns
///
/// Canonicalized absolute path if valid, error otherwise
///
/// # Examples
///
/// ```no_run
/// # use seren_converter::sqlite::validate_sqlite_path;
/// assert!(validate_sqlite_path("database.db").is_ok());
/// assert!(validate_sqlite_path("../../../etc/passwd").is_err());
/// ```
pub fn validate_sqlite_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("SQLite file path cannot be empty");
    }

    let path_buf = PathBuf::from(path);

    // Canonicalize to resolve symlinks and relative paths
    // This also validates that the file exists
    let canonical = path_buf.canonicalize().with_context(|| {
        format!(
            "Failed to resolve SQLite file path '{}'. \
             File may not exist or may not be readable.",
            path
        )
    })?;

    if !canonical.is_file() {
        bail!("Path '{}' is not a regular file (may be a directory)", path);
    }

    match canonical.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ["db", "sqlite", "sqlite3"].contains(&ext) => {}
        Some(ext) => bail!(
            "Invalid SQLite file extension '{}'. \
             Must be .db, .sqlite, or .sqlite3",
            ext
        ),
        None => bail!(
            "SQLite file '{}' has no extension. \
             Must be .db, .sqlite, or .sqlite3",
            path
        ),
    }

    tracing::debug!("Validated SQLite path: {}", canonical.display());

    Ok(canonical)
}

/// Open a SQLite database in read-only mode
///
/// The path is validated first; the connection is opened with
/// `SQLITE_OPEN_READ_ONLY` so a conversion can never modify its source.
pub fn open_sqlite(path: &str) -> Result<rusqlite::Connection> {
    let canonical = validate_sqlite_path(path)?;

    tracing::debug!("Opening SQLite database: {}", canonical.display());

    let conn = rusqlite::Connection::open_with_flags(
        &canonical,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .with_context(|| format!("Failed to open SQLite database: {}", canonical.display()))?;

    // Verify we can query the database
    let _version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .context("Failed to query SQLite version (database may be corrupted)")?;

    Ok(conn)
}
