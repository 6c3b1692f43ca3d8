// crates/certstore-sqlite/src/lease.rs
// ============================================================================
// Module: SQLite Lease Locks
// Description: Named, expiring mutual-exclusion leases for cert issuance.
// Purpose: Serialize issuance for a name across threads and processes.
// Dependencies: certstore-core, rusqlite, tracing, crate::store
// ============================================================================

//! ## Overview
//! A lease is a row in `certmagic_locks` holding an absolute expiry in unix
//! milliseconds. Acquisition is one conditional upsert: the row is inserted
//! when absent and overwritten only when its expiry has passed, so two
//! acquirers can never both observe success for a live lease. Waiting callers
//! poll at a fixed interval, never sleeping past their context deadline.
//!
//! Leases carry no owner token; any caller may release any lease.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use certstore_core::Context;
use certstore_core::StorageError;
use rusqlite::params;
use tracing::debug;

use crate::error::SqliteStoreError;
use crate::store::SqliteCertStore;
use crate::store::with_connection;
use crate::translate::affected_row;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Creates a lease, or takes over an expired one, in a single statement.
const ACQUIRE_LEASE: &str = "INSERT INTO certmagic_locks (name, expires_at)
    VALUES (?1, ?2)
    ON CONFLICT(name) DO UPDATE SET expires_at = excluded.expires_at
    WHERE certmagic_locks.expires_at <= ?3";

/// Removes a lease unconditionally.
const RELEASE_LEASE: &str = "DELETE FROM certmagic_locks WHERE name = ?1";

// ============================================================================
// SECTION: Leases
// ============================================================================

impl SqliteCertStore {
    /// Sets the lease duration applied to leases acquired from now on.
    ///
    /// Leases already held keep their original expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] when `timeout` is shorter
    /// than one millisecond; such a lease would expire as it is written.
    pub fn set_lock_timeout(&self, timeout: Duration) -> Result<(), StorageError> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Err(StorageError::InvalidArgument(
                "lock timeout must be at least one millisecond".to_string(),
            ));
        }
        self.lease_duration_ms.store(millis, Ordering::SeqCst);
        Ok(())
    }

    /// Returns the lease duration applied to new leases.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms.load(Ordering::SeqCst))
    }

    /// Makes one attempt to acquire the lease for `name`.
    ///
    /// Returns `true` when the caller now holds the lease.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] for an empty name,
    /// [`StorageError::Cancelled`] when `ctx` is done, or
    /// [`StorageError::StorageUnavailable`] when the engine fails.
    pub fn try_lock(&self, ctx: &Context, name: &str) -> Result<bool, StorageError> {
        ctx.check()?;
        validate_name(name)?;
        self.try_acquire_lease(name)
    }

    /// Acquires the lease for `name`, polling until `ctx` is done.
    pub(crate) fn acquire_lease(&self, ctx: &Context, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        let mut attempts: u64 = 0;
        loop {
            let Some(wait) = next_poll_delay(ctx, self.poll_interval) else {
                let reason = if ctx.is_cancelled() { "cancelled" } else { "deadline exceeded" };
                return Err(StorageError::LockTimeout(format!(
                    "lease {name} not acquired after {attempts} attempts: {reason}"
                )));
            };
            attempts += 1;
            if self.try_acquire_lease(name)? {
                debug!(name, attempts, "lease acquired");
                return Ok(());
            }
            thread::sleep(wait);
        }
    }

    /// Runs the conditional upsert for `name`.
    fn try_acquire_lease(&self, name: &str) -> Result<bool, StorageError> {
        let now = unix_millis();
        let lease_ms = i64::try_from(self.lease_duration_ms.load(Ordering::SeqCst))
            .unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(lease_ms);
        with_connection(&self.write_connection, |connection| {
            let changed = connection
                .execute(ACQUIRE_LEASE, params![name, expires_at, now])
                .map_err(SqliteStoreError::from)?;
            Ok(changed > 0)
        })
    }

    /// Deletes the lease row for `name`.
    pub(crate) fn release_lease(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        with_connection(&self.write_connection, |connection| {
            let changed =
                connection.execute(RELEASE_LEASE, params![name]).map_err(SqliteStoreError::from)?;
            affected_row(changed, name)
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns how long to sleep before the next attempt, or `None` once `ctx`
/// is done.
fn next_poll_delay(ctx: &Context, interval: Duration) -> Option<Duration> {
    if ctx.is_done() {
        return None;
    }
    Some(ctx.remaining().map_or(interval, |remaining| interval.min(remaining)))
}

/// Rejects empty lease names.
fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidArgument("lock name cannot be empty".to_string()));
    }
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
