// crates/certstore-core/src/interfaces.rs
// ============================================================================
// Module: Certstore Interfaces
// Description: Storage contract for certificates, keys, and lease locks.
// Purpose: Define the operations and error taxonomy storage engines provide.
// Dependencies: crate::context, thiserror, time
// ============================================================================

//! ## Overview
//! [`CertStorage`] is the only surface certificate-management code sees. Keys
//! are case-sensitive strings that may contain `/` to express hierarchy; the
//! hierarchy is purely lexical. Values are opaque, non-empty byte strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use time::OffsetDateTime;

use crate::context::Context;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage errors surfaced to certificate-management callers.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - [`StorageError::NotFound`] is only produced when the engine reported no
///   matching row; every other engine failure is
///   [`StorageError::StorageUnavailable`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Empty key, value, or lock name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Requested option is not implemented (recursive listing).
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// No matching record or lease.
    #[error("not found: {0}")]
    NotFound(String),
    /// Engine failure not attributable to absence; retryable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// Lease could not be acquired before the deadline or cancellation.
    #[error("lock timeout: {0}")]
    LockTimeout(String),
    /// Store construction failed.
    #[error("storage initialization failed: {0}")]
    Initialization(String),
    /// The call context was already done when the operation started.
    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

impl StorageError {
    /// Returns true for [`StorageError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// SECTION: Key Metadata
// ============================================================================

/// Metadata describing a stored record without its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Record key.
    pub key: String,
    /// Time of the last successful write.
    pub modified: OffsetDateTime,
    /// Value length in bytes.
    pub size: u64,
}

// ============================================================================
// SECTION: Certificate Storage
// ============================================================================

/// Key-value and lease-lock storage for certificate management.
///
/// Implementations must be safe for concurrent use by many callers without
/// external synchronization.
pub trait CertStorage: Send + Sync {
    /// Upserts `value` under `key`, replacing any prior record in full.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] when `key` or `value` is
    /// empty, or [`StorageError::StorageUnavailable`] when the write fails.
    fn store(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Loads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when no record exists.
    fn load(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Returns true when a record exists for `key`.
    ///
    /// Every failure, including engine errors, reports `false`.
    fn exists(&self, ctx: &Context, key: &str) -> bool;

    /// Deletes the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for an empty key or
    /// [`StorageError::NotFound`] when nothing was deleted.
    fn delete(&self, ctx: &Context, key: &str) -> Result<(), StorageError>;

    /// Lists every key starting with `prefix`.
    ///
    /// The match is a flat string prefix; an empty prefix matches every key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] when `recursive` is true and
    /// [`StorageError::NotFound`] when no key matches.
    fn list(&self, ctx: &Context, prefix: &str, recursive: bool)
    -> Result<Vec<String>, StorageError>;

    /// Returns metadata for `key` without reading its value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when no record exists.
    fn stat(&self, ctx: &Context, key: &str) -> Result<KeyInfo, StorageError>;

    /// Acquires the lease named `name`, blocking until it is free or `ctx` is
    /// done.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::LockTimeout`] when `ctx` finishes first.
    fn lock(&self, ctx: &Context, name: &str) -> Result<(), StorageError>;

    /// Releases the lease named `name` regardless of who acquired it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when no lease exists.
    fn unlock(&self, ctx: &Context, name: &str) -> Result<(), StorageError>;
}
