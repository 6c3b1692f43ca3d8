// crates/certstore-sqlite/tests/lease_lock.rs
// ============================================================================
// Module: SQLite Lease Lock Tests
// Description: Blocking acquisition, release, expiry, and contention tests.
// Purpose: Validate at-most-one live lease per name across callers and
//          store instances sharing one database file.
// ============================================================================

//! ## Overview
//! Integration tests for the lease lock manager:
//! - One holder at a time; waiters block until release or deadline
//! - Expired leases are taken over without blocking
//! - Cancellation wakes blocked waiters promptly
//! - Lease duration changes apply only to new leases

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Barrier;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use certstore_core::CertStorage;
use certstore_core::Context;
use certstore_core::StorageError;
use certstore_sqlite::SqliteCertStore;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn db_path(dir: &TempDir) -> String {
    dir.path().join("locks.db").to_str().expect("utf-8 temp path").to_string()
}

fn store_with_lease(dir: &TempDir, lease: Duration) -> SqliteCertStore {
    let store = SqliteCertStore::open(&db_path(dir)).expect("store init");
    store.set_lock_timeout(lease).expect("lease duration");
    store
}

const ISSUANCE: &str = "issue_cert_example.com";

// ============================================================================
// SECTION: Acquisition
// ============================================================================

#[test]
fn waiter_blocks_until_holder_unlocks() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));
    store.lock(&Context::background(), ISSUANCE).unwrap();

    let (sender, receiver) = mpsc::channel();
    let waiter = store.clone();
    let handle = thread::spawn(move || {
        let ctx = Context::with_timeout(Duration::from_secs(10));
        sender.send(waiter.lock(&ctx, ISSUANCE)).unwrap();
    });

    assert!(receiver.recv_timeout(Duration::from_millis(300)).is_err());
    store.unlock(&Context::background(), ISSUANCE).unwrap();
    let result = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(result.is_ok());
    handle.join().unwrap();
}

#[test]
fn waiter_times_out_while_lease_is_live() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));
    store.lock(&Context::background(), ISSUANCE).unwrap();

    let started = Instant::now();
    let ctx = Context::with_timeout(Duration::from_millis(200));
    let result = store.lock(&ctx, ISSUANCE);
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(StorageError::LockTimeout(_))));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2));
}

#[test]
fn expired_lease_is_taken_over_without_blocking() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_millis(100));
    store.lock(&Context::background(), ISSUANCE).unwrap();
    thread::sleep(Duration::from_millis(250));

    let third = SqliteCertStore::open(&db_path(&dir)).unwrap();
    third.set_lock_timeout(Duration::from_secs(60)).unwrap();
    assert!(third.try_lock(&Context::background(), ISSUANCE).unwrap());
    assert!(!store.try_lock(&Context::background(), ISSUANCE).unwrap());
}

#[test]
fn lock_on_expired_lease_returns_on_first_attempt() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_millis(50));
    store.lock(&Context::background(), ISSUANCE).unwrap();
    thread::sleep(Duration::from_millis(150));

    let started = Instant::now();
    store.lock(&Context::with_timeout(Duration::from_secs(5)), ISSUANCE).unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn exactly_one_concurrent_acquirer_wins() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));
    let barrier = Arc::new(Barrier::new(8));
    let handles = (0 .. 8)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.try_lock(&Context::background(), ISSUANCE).unwrap()
            })
        })
        .collect::<Vec<_>>();
    let winners = handles.into_iter().map(|handle| handle.join().unwrap()).filter(|won| *won);
    assert_eq!(winners.count(), 1);
}

#[test]
fn lease_is_exclusive_across_store_instances() {
    let dir = TempDir::new().unwrap();
    let first = store_with_lease(&dir, Duration::from_secs(60));
    let second = store_with_lease(&dir, Duration::from_secs(60));

    first.lock(&Context::background(), ISSUANCE).unwrap();
    assert!(!second.try_lock(&Context::background(), ISSUANCE).unwrap());
    assert!(second.try_lock(&Context::background(), "issue_cert_other.org").unwrap());

    second.unlock(&Context::background(), ISSUANCE).unwrap();
    assert!(second.try_lock(&Context::background(), ISSUANCE).unwrap());
}

#[test]
fn cancellation_wakes_blocked_waiter() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));
    store.lock(&Context::background(), ISSUANCE).unwrap();

    let ctx = Context::background();
    let waiter_ctx = ctx.clone();
    let waiter = store.clone();
    let handle = thread::spawn(move || {
        let started = Instant::now();
        let result = waiter.lock(&waiter_ctx, ISSUANCE);
        (result, started.elapsed())
    });

    thread::sleep(Duration::from_millis(150));
    ctx.cancel();
    let (result, elapsed) = handle.join().unwrap();
    assert!(matches!(result, Err(StorageError::LockTimeout(message)) if message.contains("cancelled")));
    assert!(elapsed < Duration::from_secs(2));
}

// ============================================================================
// SECTION: Release and Configuration
// ============================================================================

#[test]
fn unlock_without_lease_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));
    assert!(matches!(
        store.unlock(&Context::background(), ISSUANCE),
        Err(StorageError::NotFound(_))
    ));
}

#[test]
fn empty_lock_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));
    let ctx = Context::background();
    assert!(matches!(store.lock(&ctx, ""), Err(StorageError::InvalidArgument(_))));
    assert!(matches!(store.unlock(&ctx, ""), Err(StorageError::InvalidArgument(_))));
}

#[test]
fn lease_duration_change_does_not_shorten_held_leases() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));
    store.lock(&Context::background(), ISSUANCE).unwrap();

    store.set_lock_timeout(Duration::from_millis(10)).unwrap();
    assert_eq!(store.lock_timeout(), Duration::from_millis(10));
    thread::sleep(Duration::from_millis(50));
    assert!(!store.try_lock(&Context::background(), ISSUANCE).unwrap());
}

#[test]
fn sub_millisecond_lease_duration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));

    assert!(matches!(store.set_lock_timeout(Duration::ZERO), Err(StorageError::InvalidArgument(_))));
    assert!(matches!(
        store.set_lock_timeout(Duration::from_micros(900)),
        Err(StorageError::InvalidArgument(_))
    ));
    assert_eq!(store.lock_timeout(), Duration::from_secs(60));

    store.lock(&Context::background(), ISSUANCE).unwrap();
    assert!(!store.try_lock(&Context::background(), ISSUANCE).unwrap());
}

#[test]
fn lease_rows_store_absolute_expiry() {
    let dir = TempDir::new().unwrap();
    let store = store_with_lease(&dir, Duration::from_secs(60));
    store.lock(&Context::background(), ISSUANCE).unwrap();

    let raw = Connection::open(db_path(&dir)).unwrap();
    let expires_at: i64 = raw
        .query_row("SELECT expires_at FROM certmagic_locks WHERE name = ?1", [ISSUANCE], |row| {
            row.get(0)
        })
        .unwrap();
    let now_ms = i64::try_from(
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_millis(),
    )
    .unwrap();
    assert!(expires_at > now_ms + 50_000);
    assert!(expires_at <= now_ms + 60_000);

    store.unlock(&Context::background(), ISSUANCE).unwrap();
    let remaining: i64 =
        raw.query_row("SELECT COUNT(1) FROM certmagic_locks", [], |row| row.get(0)).unwrap();
    assert_eq!(remaining, 0);
}
