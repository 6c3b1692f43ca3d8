// crates/certstore-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Cert Store
// Description: Durable CertStorage backend using SQLite WAL.
// Purpose: Store certificates and coordinate issuance through one file.
// Dependencies: certstore-core, rusqlite, time, tracing
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`certstore_core::CertStorage`]
//! implementation. Records live in the `certmagic` table and issuance leases
//! in `certmagic_locks`; both tables may be shared by several processes
//! opening the same database file.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
mod lease;
mod schema;
pub mod store;
mod translate;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::DataSource;
pub use config::SqliteCertStoreConfig;
pub use error::SqliteStoreError;
pub use store::SqliteCertStore;
