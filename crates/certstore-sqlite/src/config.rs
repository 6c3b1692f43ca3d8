// crates/certstore-sqlite/src/config.rs
// ============================================================================
// Module: SQLite Cert Store Config
// Description: Connection, pragma, and lease settings for the SQLite store.
// Purpose: Describe how the store opens its data source and paces leases.
// Dependencies: serde, crate::error
// ============================================================================

//! ## Overview
//! [`SqliteCertStoreConfig`] is the single configuration input of the store.
//! Hosts usually build it from a data source name with
//! [`SqliteCertStoreConfig::new`]. Journal mode, sync mode, and the busy
//! timeout are fixed by the persisted-layout contract and are not configurable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default lease duration (ms).
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 500;
/// Default interval between lease acquisition attempts (ms).
pub const DEFAULT_LOCK_POLL_INTERVAL_MS: u64 = 50;
/// Default number of read connections.
const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Data source name selecting a private in-memory database.
const MEMORY_DATA_SOURCE: &str = ":memory:";
/// Prefix marking a `SQLite` URI data source.
const URI_PREFIX: &str = "file:";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` certificate store.
///
/// # Invariants
/// - `data_source` is non-empty.
/// - `read_pool_size`, `lock_timeout_ms`, and `lock_poll_interval_ms` are
///   greater than zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteCertStoreConfig {
    /// Data source name: a file path, a `file:` URI, or `:memory:`.
    pub data_source: String,
    /// Number of read-only connections used for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
    /// Lease duration applied to newly acquired locks, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Delay between lease acquisition attempts, in milliseconds.
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,
}

impl SqliteCertStoreConfig {
    /// Returns the default configuration for `data_source`.
    #[must_use]
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            lock_poll_interval_ms: DEFAULT_LOCK_POLL_INTERVAL_MS,
        }
    }

    /// Returns the lock polling interval.
    #[must_use]
    pub const fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    /// Validates the configuration limits.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a field is out of range.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        if self.data_source.is_empty() {
            return Err(SqliteStoreError::Invalid(
                "data source name must not be empty".to_string(),
            ));
        }
        if self.read_pool_size == 0 {
            return Err(SqliteStoreError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.lock_poll_interval_ms == 0 {
            return Err(SqliteStoreError::Invalid(
                "lock_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Classifies the configured data source name.
    #[must_use]
    pub fn source(&self) -> DataSource {
        DataSource::parse(&self.data_source)
    }
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

/// Returns the default lease duration in milliseconds.
const fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

/// Returns the default lease polling interval in milliseconds.
const fn default_lock_poll_interval_ms() -> u64 {
    DEFAULT_LOCK_POLL_INTERVAL_MS
}

// ============================================================================
// SECTION: Data Source
// ============================================================================

/// Parsed form of a data source name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Plain file path; parent directories are created on open.
    File(PathBuf),
    /// `file:` URI passed to `SQLite` with URI parsing enabled.
    Uri(String),
    /// Private in-memory database bound to a single connection.
    Memory,
}

impl DataSource {
    /// Parses a data source name.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if name == MEMORY_DATA_SOURCE {
            Self::Memory
        } else if name.starts_with(URI_PREFIX) {
            Self::Uri(name.to_string())
        } else {
            Self::File(PathBuf::from(name))
        }
    }

    /// Returns true when separate connections see the same database.
    #[must_use]
    pub const fn supports_read_pool(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}
