// crates/certstore-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Cert Store Errors
// Description: Engine-level errors and their mapping to storage errors.
// Purpose: Keep rusqlite failures out of the public storage taxonomy.
// Dependencies: certstore-core, thiserror
// ============================================================================

//! ## Overview
//! Engine failures are reported as [`SqliteStoreError`] inside the crate and
//! converted to [`StorageError`] at the public boundary. Construction-time
//! failures always surface as [`StorageError::Initialization`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use certstore_core::StorageError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages never embed stored values.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error, including poisoned connection mutexes.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Invalid configuration or input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for StorageError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Invalid(message) => Self::InvalidArgument(message),
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

impl SqliteStoreError {
    /// Maps a construction-time failure into [`StorageError::Initialization`].
    #[must_use]
    pub fn into_initialization(self) -> StorageError {
        StorageError::Initialization(self.to_string())
    }
}
