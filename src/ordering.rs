//! Named memory orderings for node and root access.
//!
//! Every atomic access in the tree goes through one of these constants so
//! the pairing between optimistic readers and latched writers stays visible
//! at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading node fields during optimistic traversal.
/// Pairs with the writer's `WRITE_ORD` stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for writing node fields while the latch is held.
/// A reader that observes the new value also observes the latch.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for a successful latch CAS.
/// Later field stores cannot be reordered before the latch is visible.
pub const CAS_SUCCESS: Ordering = Ordering::Acquire;

/// Ordering for a failed latch CAS. Only the current word is needed.
pub const CAS_FAILURE: Ordering = Ordering::Relaxed;

/// Ordering for relaxed loads: counters, and fields read under the latch.
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Ordering for version snapshots and validation.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Ordering for releasing a latch (bump version, clear lock bit).
pub const UNLOCK_ORD: Ordering = Ordering::Release;

/// Ordering for loading the tree's root pointer.
pub const ROOT_LOAD: Ordering = Ordering::Acquire;

/// Ordering for publishing a new root.
pub const ROOT_PUBLISH: Ordering = Ordering::Release;
