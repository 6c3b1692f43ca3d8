// crates/certstore-core/src/context.rs
// ============================================================================
// Module: Certstore Call Context
// Description: Caller-supplied deadline and cancellation handle.
// Purpose: Bound every storage operation by a single caller-owned signal.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`Context`] is handed to every [`crate::CertStorage`] operation. It
//! carries an optional absolute deadline and a shared cancellation flag.
//! Clones share the flag, so any clone may cancel the operations bound to it.
//! Storage engines consult the context before touching the engine and, for
//! blocking lease acquisition, between polls.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::interfaces::StorageError;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Deadline and cancellation handle for a storage call.
///
/// # Invariants
/// - The deadline never changes after construction.
/// - Cancellation is one-way; a cancelled context stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Absolute deadline, if any.
    deadline: Option<Instant>,
    /// Shared cancellation flag.
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Returns a context with no deadline that is never done unless cancelled.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a context that expires `timeout` from now.
    ///
    /// A timeout too large to represent is treated as no deadline.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the absolute deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`Context::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns true when the deadline has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Returns true when the context is cancelled or expired.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Returns the time left before the deadline.
    ///
    /// `None` means there is no deadline; an elapsed deadline yields
    /// [`Duration::ZERO`].
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fails with [`StorageError::Cancelled`] when the context is done.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Cancelled`] if the context was cancelled or its
    /// deadline elapsed.
    pub fn check(&self) -> Result<(), StorageError> {
        if self.is_cancelled() {
            return Err(StorageError::Cancelled("context cancelled".to_string()));
        }
        if self.is_expired() {
            return Err(StorageError::Cancelled("context deadline exceeded".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::time::Duration;
    use std::time::Instant;

    use super::Context;
    use crate::StorageError;

    #[test]
    fn background_context_is_never_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.remaining().is_none());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_is_shared_across_clones() {
        let ctx = Context::with_timeout(Duration::from_secs(60));
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(StorageError::Cancelled(_))));
    }

    #[test]
    fn elapsed_deadline_is_done_with_zero_remaining() {
        let ctx = Context::with_deadline(Instant::now());
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining().unwrap(), Duration::ZERO);
        assert!(matches!(ctx.check(), Err(StorageError::Cancelled(message)) if message.contains("deadline")));
    }
}
