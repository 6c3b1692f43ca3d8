// crates/certstore-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema and Pragmas
// Description: Connection opening, pragma application, and table creation.
// Purpose: Bring every connection to the concurrency settings the store needs.
// Dependencies: rusqlite, crate::{config, error}
// ============================================================================

//! ## Overview
//! Every connection the store opens gets the same fixed pragmas: WAL journal
//! mode so readers never block on the writer, full synchronous writes, a
//! 5000 ms busy timeout so contending writers retry inside `SQLite` for a
//! bounded window, and `case_sensitive_like` so prefix listing compares bytes
//! exactly. None of these are configurable; other processes sharing the file
//! rely on them. Table creation is idempotent and runs once, on the writer
//! connection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;

use crate::config::DataSource;
use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Busy timeout applied to every connection.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Journal mode reported by `SQLite` once WAL is active.
const WAL_JOURNAL_MODE: &str = "wal";
/// Journal mode reported for in-memory databases, which cannot use WAL.
const MEMORY_JOURNAL_MODE: &str = "memory";

/// Record table definition. Layout is shared with existing data files.
const CREATE_RECORD_TABLE: &str = "CREATE TABLE IF NOT EXISTS certmagic (
    key TEXT NOT NULL PRIMARY KEY,
    value BLOB NOT NULL,
    modified TEXT NOT NULL,
    size INTEGER NOT NULL
);";

/// Lease table definition.
const CREATE_LEASE_TABLE: &str = "CREATE TABLE IF NOT EXISTS certmagic_locks (
    name TEXT NOT NULL PRIMARY KEY,
    expires_at INTEGER NOT NULL
);";

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Opens an `SQLite` connection for `source` and applies store pragmas.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the path is unusable, the engine cannot
/// open the database, or a pragma fails.
pub fn open_connection(source: &DataSource) -> Result<Connection, SqliteStoreError> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = match source {
        DataSource::File(path) => {
            validate_store_path(path)?;
            ensure_parent_dir(path)?;
            Connection::open_with_flags(path, flags)?
        }
        DataSource::Uri(uri) => {
            flags |= OpenFlags::SQLITE_OPEN_URI;
            Connection::open_with_flags(uri, flags)?
        }
        DataSource::Memory => Connection::open_in_memory_with_flags(flags)?,
    };
    apply_pragmas(&connection)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for concurrency and prefix matching.
///
/// `journal_mode` reports the mode actually in effect; a file database that
/// stays out of WAL fails here instead of serving writers that block readers.
fn apply_pragmas(connection: &Connection) -> Result<(), SqliteStoreError> {
    let journal_mode: String =
        connection.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    let journal_mode = journal_mode.to_ascii_lowercase();
    if journal_mode != WAL_JOURNAL_MODE && journal_mode != MEMORY_JOURNAL_MODE {
        return Err(SqliteStoreError::Db(format!(
            "journal mode is {journal_mode}, expected {WAL_JOURNAL_MODE}"
        )));
    }
    connection.execute_batch("PRAGMA synchronous = FULL;")?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.execute_batch("PRAGMA case_sensitive_like = true;")?;
    Ok(())
}

/// Creates the record and lease tables when absent.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when table creation fails.
pub fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(CREATE_RECORD_TABLE)?;
    connection.execute_batch(CREATE_LEASE_TABLE)?;
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::open_connection;
    use crate::config::DataSource;

    #[test]
    fn connections_carry_fixed_busy_timeout_and_case_sensitive_like() {
        let connection = open_connection(&DataSource::Memory).unwrap();
        let busy_timeout: i64 =
            connection.query_row("PRAGMA busy_timeout", [], |row| row.get(0)).unwrap();
        assert_eq!(busy_timeout, 5_000);

        let matched: bool =
            connection.query_row("SELECT 'Key1' LIKE 'key1'", [], |row| row.get(0)).unwrap();
        assert!(!matched);
    }
}
