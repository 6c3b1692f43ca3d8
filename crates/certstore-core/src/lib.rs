// crates/certstore-core/src/lib.rs
// ============================================================================
// Module: Certstore Core Library
// Description: Public API surface for the certificate storage contract.
// Purpose: Expose the storage trait, metadata, errors, and call context.
// Dependencies: crate::{context, interfaces}
// ============================================================================

//! ## Overview
//! Certstore core defines the key-value and lease-locking contract consumed by
//! certificate-management code. Storage engines implement [`CertStorage`];
//! callers rely on [`StorageError`] to decide between reissuing a certificate
//! ([`StorageError::NotFound`]), retrying later
//! ([`StorageError::StorageUnavailable`]), or backing off while another
//! issuance is in flight ([`StorageError::LockTimeout`]).

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod interfaces;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::Context;
pub use interfaces::CertStorage;
pub use interfaces::KeyInfo;
pub use interfaces::StorageError;
