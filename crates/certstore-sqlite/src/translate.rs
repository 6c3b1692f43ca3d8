// crates/certstore-sqlite/src/translate.rs
// ============================================================================
// Module: Not-Found Translation
// Description: Maps engine absence signals onto StorageError::NotFound.
// Purpose: Keep reissue-vs-retry decisions uniform across read operations.
// Dependencies: certstore-core, rusqlite, crate::error
// ============================================================================

//! ## Overview
//! `SQLite` reports absence three ways: a query that returns no rows, a
//! statement that affects no rows, and an empty result set. Each maps to the
//! single canonical [`StorageError::NotFound`]. Every other engine failure
//! becomes [`StorageError::StorageUnavailable`] and is never masked as absence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use certstore_core::StorageError;

use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Translates a single-row query result.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] for `QueryReturnedNoRows` and
/// [`StorageError::StorageUnavailable`] for every other engine error.
pub fn found_row<T>(result: rusqlite::Result<T>, subject: &str) -> Result<T, StorageError> {
    match result {
        Ok(value) => Ok(value),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(not_found(subject)),
        Err(err) => Err(SqliteStoreError::from(err).into()),
    }
}

/// Translates the affected-row count of a keyed mutation.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] when no row was affected.
pub fn affected_row(changed: usize, subject: &str) -> Result<(), StorageError> {
    if changed == 0 {
        return Err(not_found(subject));
    }
    Ok(())
}

/// Translates a multi-row result set.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] when the set is empty.
pub fn non_empty<T>(rows: Vec<T>, subject: &str) -> Result<Vec<T>, StorageError> {
    if rows.is_empty() {
        return Err(not_found(subject));
    }
    Ok(rows)
}

/// Builds the canonical absence error.
fn not_found(subject: &str) -> StorageError {
    StorageError::NotFound(subject.to_string())
}

// ============================================================================
// SECTION: Prefix Patterns
// ============================================================================

/// Escape character used by prefix `LIKE` patterns.
pub const LIKE_ESCAPE: char = '\\';

/// Escapes `LIKE` metacharacters so `prefix` matches literally.
#[must_use]
pub fn escape_like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}
