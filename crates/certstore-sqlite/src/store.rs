// crates/certstore-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Cert Store
// Description: Durable CertStorage backed by SQLite WAL.
// Purpose: Persist certificates, keys, and account metadata as keyed records.
// Dependencies: certstore-core, rusqlite, time, tracing
// ============================================================================

//! ## Overview
//! [`SqliteCertStore`] implements [`CertStorage`] over a single `certmagic`
//! table. Writes go through one mutex-guarded writer connection; reads are
//! spread round-robin across a pool of read connections, which under WAL
//! never wait on an in-flight write. Each mutation is a single statement, so
//! a cancelled caller can never leave a partially written record behind.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use certstore_core::CertStorage;
use certstore_core::Context;
use certstore_core::KeyInfo;
use certstore_core::StorageError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::UtcOffset;
use time::format_description::BorrowedFormatItem;
use time::parsing::Parsed;
use time::macros::format_description;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::SqliteCertStoreConfig;
use crate::error::SqliteStoreError;
use crate::schema::initialize_schema;
use crate::schema::open_connection;
use crate::translate::affected_row;
use crate::translate::escape_like_prefix;
use crate::translate::found_row;
use crate::translate::non_empty;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed-width UTC layout for the `modified` column; sorts lexically.
const MODIFIED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z");

/// Layout of `modified` values in older data files (`01/02 03:04:05PM '06 -0700`).
/// Read-only; new writes always use [`MODIFIED_FORMAT`].
const LEGACY_MODIFIED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month]/[day] [hour repr:12]:[minute]:[second][period] '[year repr:last_two] [offset_hour sign:mandatory][offset_minute]");

/// Two-digit legacy years below this pivot are in the 2000s, the rest in the 1900s.
const LEGACY_YEAR_PIVOT: i32 = 69;

/// Upserts a record. `modified` never moves backwards for a key.
const UPSERT_RECORD: &str = "INSERT INTO certmagic (key, value, modified, size)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        modified = max(excluded.modified, certmagic.modified),
        size = excluded.size";

/// Loads a record value.
const SELECT_VALUE: &str = "SELECT value FROM certmagic WHERE key = ?1";

/// Probes for a record without reading its value.
const SELECT_EXISTS: &str = "SELECT 1 FROM certmagic WHERE key = ?1";

/// Loads record metadata.
const SELECT_STAT: &str = "SELECT modified, size FROM certmagic WHERE key = ?1";

/// Deletes a record.
const DELETE_RECORD: &str = "DELETE FROM certmagic WHERE key = ?1";

/// Lists keys by literal prefix; relies on `case_sensitive_like`.
const LIST_KEYS: &str =
    "SELECT key FROM certmagic WHERE key LIKE ?1 || '%' ESCAPE '\\' ORDER BY key";

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed certificate store with WAL support.
///
/// # Invariants
/// - Writes are serialized through the writer connection mutex.
/// - Every connection carries the store pragmas, including
///   `case_sensitive_like`.
/// - In-memory data sources use the writer connection for reads.
#[derive(Clone)]
pub struct SqliteCertStore {
    /// Data source name the store was opened with.
    data_source: Arc<str>,
    /// Shared writer connection guarded by a mutex.
    pub(crate) write_connection: Arc<Mutex<Connection>>,
    /// Read connection pool used for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
    /// Lease duration for future acquisitions, in milliseconds.
    pub(crate) lease_duration_ms: Arc<AtomicU64>,
    /// Delay between lease acquisition attempts.
    pub(crate) poll_interval: Duration,
}

impl SqliteCertStore {
    /// Opens a store for `data_source` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Initialization`] when the data source is empty
    /// or the database cannot be opened and initialized.
    pub fn open(data_source: &str) -> Result<Self, StorageError> {
        Self::new(SqliteCertStoreConfig::new(data_source))
    }

    /// Opens a store from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Initialization`] when the configuration is
    /// invalid or the database cannot be opened and initialized.
    pub fn new(config: SqliteCertStoreConfig) -> Result<Self, StorageError> {
        Self::initialize(&config).map_err(|err| {
            warn!(data_source = %config.data_source, error = %err, "sqlite cert store init failed");
            err.into_initialization()
        })
    }

    /// Opens connections, applies pragmas, and creates tables.
    fn initialize(config: &SqliteCertStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        let source = config.source();
        let write_connection = open_connection(&source)?;
        initialize_schema(&write_connection)?;
        let pool_size = if source.supports_read_pool() { config.read_pool_size } else { 0 };
        let mut read_connections = Vec::with_capacity(pool_size);
        for _ in 0 .. pool_size {
            read_connections.push(Mutex::new(open_connection(&source)?));
        }
        info!(
            data_source = %config.data_source,
            read_pool_size = pool_size,
            "opened sqlite cert store"
        );
        Ok(Self {
            data_source: Arc::from(config.data_source.as_str()),
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
            lease_duration_ms: Arc::new(AtomicU64::new(config.lock_timeout_ms)),
            poll_interval: config.lock_poll_interval(),
        })
    }

    /// Returns the data source name the store was opened with.
    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Returns the next read connection in round-robin order.
    fn read_connection(&self) -> &Mutex<Connection> {
        if self.read_connections.is_empty() {
            return self.write_connection.as_ref();
        }
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_connections.len();
        self.read_connections.get(index).unwrap_or_else(|| self.write_connection.as_ref())
    }

    /// Upserts a record with a fresh `modified` timestamp.
    fn store_record(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        if value.is_empty() {
            return Err(StorageError::InvalidArgument("value cannot be empty".to_string()));
        }
        let size = i64::try_from(value.len())
            .map_err(|_| StorageError::InvalidArgument("value too large".to_string()))?;
        let modified = format_modified(OffsetDateTime::now_utc())?;
        with_connection(&self.write_connection, |connection| {
            connection
                .execute(UPSERT_RECORD, params![key, value, modified, size])
                .map_err(SqliteStoreError::from)?;
            Ok(())
        })
    }

    /// Reads a record value.
    fn load_record(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        with_connection(self.read_connection(), |connection| {
            found_row(connection.query_row(SELECT_VALUE, params![key], |row| row.get(0)), key)
        })
    }

    /// Probes for a record.
    fn record_exists(&self, key: &str) -> Result<bool, StorageError> {
        with_connection(self.read_connection(), |connection| {
            let found = connection
                .query_row(SELECT_EXISTS, params![key], |_| Ok(()))
                .optional()
                .map_err(SqliteStoreError::from)?;
            Ok(found.is_some())
        })
    }

    /// Removes a record.
    fn delete_record(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        with_connection(&self.write_connection, |connection| {
            let changed =
                connection.execute(DELETE_RECORD, params![key]).map_err(SqliteStoreError::from)?;
            affected_row(changed, key)
        })
    }

    /// Lists keys sharing a literal prefix.
    fn list_keys(&self, prefix: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
        if recursive {
            return Err(StorageError::Unsupported("recursive listing".to_string()));
        }
        let pattern = escape_like_prefix(prefix);
        let keys = with_connection(self.read_connection(), |connection| {
            let mut statement = connection.prepare_cached(LIST_KEYS).map_err(SqliteStoreError::from)?;
            let rows = statement
                .query_map(params![pattern], |row| row.get::<_, String>(0))
                .map_err(SqliteStoreError::from)?;
            let keys = rows.collect::<Result<Vec<_>, _>>().map_err(SqliteStoreError::from)?;
            Ok(keys)
        })?;
        non_empty(keys, &format!("keys with prefix {prefix}"))
    }

    /// Reads record metadata without the value.
    fn stat_record(&self, key: &str) -> Result<KeyInfo, StorageError> {
        let (modified, size) = with_connection(self.read_connection(), |connection| {
            found_row(
                connection.query_row(SELECT_STAT, params![key], |row| {
                    let modified: String = row.get(0)?;
                    let size: i64 = row.get(1)?;
                    Ok((modified, size))
                }),
                key,
            )
        })?;
        let modified = parse_modified(&modified)?;
        let size = u64::try_from(size)
            .map_err(|_| SqliteStoreError::Corrupt(format!("negative size for key {key}")))?;
        Ok(KeyInfo {
            key: key.to_string(),
            modified,
            size,
        })
    }
}

impl CertStorage for SqliteCertStore {
    fn store(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<(), StorageError> {
        ctx.check()?;
        let result = self.store_record(key, value);
        trace_outcome("store", key, &result);
        result
    }

    fn load(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, StorageError> {
        ctx.check()?;
        let result = self.load_record(key);
        trace_outcome("load", key, &result);
        result
    }

    fn exists(&self, ctx: &Context, key: &str) -> bool {
        if ctx.is_done() {
            return false;
        }
        let result = self.record_exists(key);
        trace_outcome("exists", key, &result);
        result.unwrap_or(false)
    }

    fn delete(&self, ctx: &Context, key: &str) -> Result<(), StorageError> {
        ctx.check()?;
        let result = self.delete_record(key);
        trace_outcome("delete", key, &result);
        result
    }

    fn list(
        &self,
        ctx: &Context,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<String>, StorageError> {
        ctx.check()?;
        let result = self.list_keys(prefix, recursive);
        trace_outcome("list", prefix, &result);
        result
    }

    fn stat(&self, ctx: &Context, key: &str) -> Result<KeyInfo, StorageError> {
        ctx.check()?;
        let result = self.stat_record(key);
        trace_outcome("stat", key, &result);
        result
    }

    fn lock(&self, ctx: &Context, name: &str) -> Result<(), StorageError> {
        let result = self.acquire_lease(ctx, name);
        trace_outcome("lock", name, &result);
        result
    }

    fn unlock(&self, ctx: &Context, name: &str) -> Result<(), StorageError> {
        ctx.check()?;
        let result = self.release_lease(name);
        trace_outcome("unlock", name, &result);
        result
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs `op` against a locked connection.
///
/// # Errors
///
/// Returns [`StorageError::StorageUnavailable`] when the mutex is poisoned,
/// otherwise whatever `op` returns.
pub(crate) fn with_connection<T>(
    connection: &Mutex<Connection>,
    op: impl FnOnce(&Connection) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let guard = connection
        .lock()
        .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))?;
    op(&guard)
}

/// Rejects empty record keys.
fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidArgument("key cannot be empty".to_string()));
    }
    Ok(())
}

/// Formats a write timestamp for the `modified` column.
fn format_modified(at: OffsetDateTime) -> Result<String, SqliteStoreError> {
    at.format(MODIFIED_FORMAT)
        .map_err(|err| SqliteStoreError::Io(format!("failed to format timestamp: {err}")))
}

/// Parses a stored `modified` column value as UTC.
///
/// Falls back to the legacy layout so rows written before the fixed-width
/// format remain readable.
fn parse_modified(text: &str) -> Result<OffsetDateTime, SqliteStoreError> {
    match PrimitiveDateTime::parse(text, MODIFIED_FORMAT) {
        Ok(at) => Ok(at.assume_utc()),
        Err(err) => parse_legacy_modified(text).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("unparsable modified timestamp: {err}"))
        }),
    }
}

/// Parses a legacy `modified` value and normalizes it to UTC.
fn parse_legacy_modified(text: &str) -> Option<OffsetDateTime> {
    let mut parsed = Parsed::new();
    let remaining = parsed.parse_items(text.as_bytes(), LEGACY_MODIFIED_FORMAT).ok()?;
    if !remaining.is_empty() {
        return None;
    }
    let last_two = i32::from(parsed.year_last_two()?);
    let century = if last_two < LEGACY_YEAR_PIVOT { 2000 } else { 1900 };
    parsed.set_year(century + last_two)?;
    let at = OffsetDateTime::try_from(parsed).ok()?;
    Some(at.to_offset(UtcOffset::UTC))
}

/// Emits a structured event for an operation outcome.
fn trace_outcome<T>(operation: &'static str, subject: &str, result: &Result<T, StorageError>) {
    match result {
        Ok(_) => debug!(operation, subject, "cert store operation succeeded"),
        Err(err @ StorageError::StorageUnavailable(_)) => {
            warn!(operation, subject, error = %err, "cert store engine failure");
        }
        Err(err @ StorageError::LockTimeout(_)) => {
            warn!(operation, subject, error = %err, "cert store lease not acquired");
        }
        Err(err) => debug!(operation, subject, error = %err, "cert store operation failed"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use time::macros::datetime;

    use super::format_modified;
    use super::parse_modified;
    use crate::error::SqliteStoreError;

    #[test]
    fn modified_format_is_fixed_width_and_sortable() {
        let earlier = format_modified(datetime!(2026-01-02 03:04:05.000000007 UTC)).unwrap();
        let later = format_modified(datetime!(2026-01-02 03:04:05.1 UTC)).unwrap();
        assert_eq!(earlier, "2026-01-02T03:04:05.000000007Z");
        assert_eq!(earlier.len(), later.len());
        assert!(earlier < later);
    }

    #[test]
    fn modified_round_trips_at_nanosecond_resolution() {
        let at = datetime!(2025-12-31 23:59:59.123456789 UTC);
        assert_eq!(parse_modified(&format_modified(at).unwrap()).unwrap(), at);
    }

    #[test]
    fn legacy_layout_is_read_as_utc() {
        let at = parse_modified("01/02 03:04:05PM '06 -0700").unwrap();
        assert_eq!(at, datetime!(2006-01-02 22:04:05 UTC));

        let at = parse_modified("11/30 12:00:00AM '99 +0530").unwrap();
        assert_eq!(at, datetime!(1999-11-29 18:30:00 UTC));
    }

    #[test]
    fn unknown_layouts_are_reported_as_corrupt() {
        assert!(matches!(parse_modified("yesterday"), Err(SqliteStoreError::Corrupt(_))));
        assert!(parse_modified("01/02 03:04:05PM '06 -0700 trailing").is_err());
    }
}
