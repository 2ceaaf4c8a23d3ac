//! Filepath: src/nodeversion.rs
//!
//! Versioned latch word for optimistic concurrency control.
//!
//! [`NodeVersion`] packs a lock bit and a monotonically increasing version
//! counter into a single `u64`. Readers never take the latch: they snapshot
//! the word, read the node, and validate that the word did not move.
//! Writers take the latch with a single compare-and-swap against the
//! version they snapshotted.
//!
//! # Concurrency Model
//! 1. Readers: Call `stable()` to get a version, perform reads, call `has_changed()`.
//! 2. Writers: Call `try_lock_at(version)` (or `lock()`) to get a [`LockGuard`],
//!    modify the node, let the guard drop.
//!
//! Every guard drop bumps the version, so any reader whose snapshot predates
//! the critical section observes the change and restarts.
//!
//! # Type-State Pattern
//! The [`LockGuard`] type is proof that the latch is held. The guard
//! releases the latch on drop (panic-safe).
//!
//! ```rust,ignore
//! let v = version.stable();
//! if let Some(guard) = version.try_lock_at(v) {
//!     // mutate the node
//! } // released here, version bumped
//! ```

use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;

use crate::backoff::Backoff;
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, RELAXED, UNLOCK_ORD, VERSION_ORD};



// ============================================================================
//  Bit Constants
// ============================================================================

/// Lock bit: node is latched for modification.
pub const LOCK_BIT: u64 = 1;

/// Amount a release adds to a locked word. Clears the lock bit and carries
/// into the version counter.
const UNLOCK_STEP: u64 = 1;

/// Strip the lock bit from a raw version word.
#[inline(always)]
#[must_use]
pub const fn unlocked(value: u64) -> u64 {
    value & !LOCK_BIT
}

// ============================================================================
//  NodeVersion
// ============================================================================

/// A versioned latch for tree nodes.
///
/// # Layout
/// Bits 1-63: `version` | Bit 0: `locked`
///
/// # Example
///
/// ```rust
/// use blinktree::nodeversion::NodeVersion;
///
/// let v = NodeVersion::new();
/// let snapshot = v.stable();
///
/// {
///     let _guard = v.try_lock_at(snapshot).expect("uncontended");
///     assert!(v.is_locked());
/// }
///
/// assert!(!v.is_locked());
/// assert!(v.has_changed(snapshot));
/// ```
#[derive(Debug)]
pub struct NodeVersion {
    value: AtomicU64,
}

// ============================================================================
//  LockGuard (Type-State Pattern)
// ============================================================================

/// Zero-sized proof that a latch is held.
///
/// Cannot be constructed except through [`NodeVersion::try_lock_at()`] or
/// [`NodeVersion::lock()`]. The latch is released when the guard drops,
/// bumping the version so concurrent optimistic readers restart.
///
/// Guards are `!Send` and `!Sync` via `PhantomData<*mut ()>`: a latch is
/// always released by the thread that took it.
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the latch"]
pub struct LockGuard<'a> {
    version: &'a NodeVersion,
    locked_value: u64,
    _marker: PhantomData<*mut ()>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // locked_value is odd, so +1 clears the lock bit and advances the
        // version in one store.
        self.version
            .value
            .store(self.locked_value + UNLOCK_STEP, UNLOCK_ORD);
    }
}

impl LockGuard<'_> {
    /// Get the locked word (version with the lock bit set).
    #[inline]
    #[must_use]
    pub const fn locked_value(&self) -> u64 {
        self.locked_value
    }
}

impl NodeVersion {
    /// Create a new, unlocked version at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Create a node version from a raw value.
    ///
    ///  WARN: ONLY FOR TESTING.
    #[must_use]
    pub const fn from_value(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    /// Check if the latch is currently held.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        (self.value.load(RELAXED) & LOCK_BIT) != 0
    }

    /// Get the raw word.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.load(RELAXED)
    }

    // ========================================================================
    // Stable Version (for optimistic reads)
    // ========================================================================

    /// Get an unlocked version value for optimistic reading.
    ///
    /// Spins (with backoff) while a writer holds the latch, so the returned
    /// value never has the lock bit set. Use with `has_changed()` after reading.
    #[inline]
    #[must_use]
    pub fn stable(&self) -> u64 {
        let mut backoff = Backoff::new();

        loop {
            let value: u64 = self.value.load(VERSION_ORD);
            if value & LOCK_BIT == 0 {
                return value;
            }

            backoff.snooze();
        }
    }

    /// Check if the word moved since `old` was snapshotted.
    ///
    /// A latch held right now counts as a change: the holder may be in the
    /// middle of mutating the fields the caller just read.
    #[inline]
    #[must_use]
    pub fn has_changed(&self, old: u64) -> bool {
        self.value.load(VERSION_ORD) != old
    }

    // ========================================================================
    // Latch Operations (Type-State Pattern)
    // ========================================================================

    /// Attempt to take the latch exactly at version `expected`.
    ///
    /// One compare-and-swap from `(expected, unlocked)` to
    /// `(expected, locked)`. Fails if any writer touched the node since
    /// `expected` was read, or if the latch is held.
    #[inline]
    #[must_use]
    pub fn try_lock_at(&self, expected: u64) -> Option<LockGuard<'_>> {
        let expected: u64 = unlocked(expected);
        let locked: u64 = expected | LOCK_BIT;

        match self
            .value
            .compare_exchange(expected, locked, CAS_SUCCESS, CAS_FAILURE)
        {
            Ok(_) => Some(LockGuard {
                version: self,
                locked_value: locked,
                _marker: PhantomData,
            }),

            Err(_) => None,
        }
    }

    /// Take the latch, spinning until it is won.
    ///
    /// Repeatedly strips the lock bit from the current word and retries
    /// `try_lock_at`. No OS blocking primitive is involved.
    pub fn lock(&self) -> LockGuard<'_> {
        let mut backoff = Backoff::new();

        loop {
            let current: u64 = self.value.load(RELAXED);

            if current & LOCK_BIT == 0
                && let Some(guard) = self.try_lock_at(current)
            {
                return guard;
            }

            backoff.snooze();
        }
    }
}

impl Default for NodeVersion {
    fn default() -> Self {
        Self::new()
    }
}
