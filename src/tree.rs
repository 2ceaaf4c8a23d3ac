//! Filepath: src/tree.rs
//!
//! `BLinkTree` - the root pointer and root growth.
//!
//! The tree owns one atomic root pointer. Everything below the root is
//! handled by the node protocol ([`Node::insert`], [`Node::search`]); the
//! tree only steps in when the root itself is full, which is the one split
//! that has no parent to absorb it.
//!
//! # Root Growth
//!
//! ```text
//! 1. snapshot root R and v = R.version.stable()
//! 2. R full:
//!      build half-split of R and an empty internal node   (speculative)
//!      try_lock_at(R, v), check root == R                 (else drop, restart)
//!      new_root = [R | sep | right], R.truncate(sep, right)
//!      root.store(new_root), unlatch R
//!      insert at new_root (Retry -> restart)
//! 3. R not full:
//!      root == R and R unchanged since v?                 (else restart)
//!      insert at R (Retry -> restart)
//! ```
//!
//! Old roots are never freed: they remain as the leftmost child of the new
//! root, so a reader holding a stale root pointer still sees a valid subtree
//! and moves right into the rest of the level.

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicUsize};

use crate::alloc;
use crate::backoff::Backoff;
use crate::node::{InsertOutcome, Node};
use crate::ordering::{RELAXED, ROOT_LOAD, ROOT_PUBLISH};
use crate::tracing_helpers::{debug_log, trace_log};

pub mod stats;
mod traverse;
mod validate;

#[cfg(test)]
pub mod test_hooks;


pub use stats::{StatsSnapshot, TreeStats};
pub use traverse::Iter;
pub use validate::InvariantViolation;

// ============================================================================
//  BLinkTree
// ============================================================================

/// A concurrent B-link tree mapping `u64` keys to values of type `V`.
///
/// All operations take `&self`; share the tree between threads with `Arc`
/// or scoped threads. Inserts never overwrite: inserting an existing key
/// adds a second slot, and [`search`](Self::search) returns the newest one.
///
/// # Type Parameters
/// * `V` - Value type, boxed once per insert and freed when the tree drops.
/// * `ORDER` - Minimum fanout. Nodes hold up to `2 * ORDER - 1` keys.
///
/// # Example
///
/// ```rust
/// use blinktree::BLinkTree;
///
/// let tree: BLinkTree<&str> = BLinkTree::new();
/// tree.insert(2, "two");
/// tree.insert(1, "one");
///
/// assert_eq!(tree.search(1), Some(&"one"));
/// assert_eq!(tree.search(3), None);
/// assert!(tree.check(1));
/// ```
pub struct BLinkTree<V, const ORDER: usize = 8> {
    /// Current root. Replaced only by root growth.
    root: AtomicPtr<Node<V, ORDER>>,

    /// Committed inserts.
    count: AtomicUsize,

    /// Protocol counters.
    stats: TreeStats,

    #[cfg(test)]
    hooks: test_hooks::TreeHooks,

    /// The tree owns boxed `V`s behind raw pointers.
    _marker: PhantomData<*const V>,
}

// SAFETY: values are only shared by reference (`search`, `iter`) and moved
// in by `insert`, so `V: Send + Sync` covers every cross-thread use. Nodes
// are synchronised by their version latches.
unsafe impl<V: Send + Sync, const ORDER: usize> Send for BLinkTree<V, ORDER> {}

// SAFETY: see `Send`.
unsafe impl<V: Send + Sync, const ORDER: usize> Sync for BLinkTree<V, ORDER> {}

impl<V, const ORDER: usize> BLinkTree<V, ORDER> {
    /// Create an empty tree whose root is an empty leaf.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: AtomicPtr::new(alloc::publish(Node::new_leaf())),
            count: AtomicUsize::new(0),
            stats: TreeStats::new(),
            #[cfg(test)]
            hooks: test_hooks::TreeHooks::default(),
            _marker: PhantomData,
        }
    }

    // ========================================================================
    //  Insert
    // ========================================================================

    /// Insert `value` under `key`.
    ///
    /// Always succeeds eventually; contention is resolved by retrying.
    /// Duplicate keys are kept, not replaced.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip(self, value))
    )]
    pub fn insert(&self, key: u64, value: V) {
        let value: *mut V = Box::into_raw(Box::new(value));
        let mut backoff = Backoff::new();
        let mut retrying: bool = false;

        loop {
            if retrying {
                self.stats.record_root_retry();
                backoff.snooze();
            }
            retrying = true;

            let root_ptr: *mut Node<V, ORDER> = self.root.load(ROOT_LOAD);
            // SAFETY: the root pointer always refers to a published node.
            let root: &Node<V, ORDER> = unsafe { &*root_ptr };
            let version: u64 = root.version().stable();

            if root.is_full() {
                let Some(new_root) = self.grow_root(root_ptr, version) else {
                    continue;
                };

                if new_root.insert(key, value, &self.stats) == InsertOutcome::Inserted {
                    break;
                }
                continue;
            }

            if self.root.load(ROOT_LOAD) != root_ptr || root.version().has_changed(version) {
                trace_log!(key, "root moved under insert, restarting");
                continue;
            }

            if root.insert(key, value, &self.stats) == InsertOutcome::Inserted {
                break;
            }
        }

        self.count.fetch_add(1, RELAXED);
    }

    /// Replace the full root `root_ptr` (snapshotted at `version`) with a new
    /// internal root over its two halves.
    ///
    /// Returns the new root, or `None` if another thread touched the old root
    /// first.
    fn grow_root(&self, root_ptr: *mut Node<V, ORDER>, version: u64) -> Option<&Node<V, ORDER>> {
        // SAFETY: caller loaded `root_ptr` from `self.root`.
        let root: &Node<V, ORDER> = unsafe { &*root_ptr };

        // Speculative: both boxes are dropped if the latch below fails.
        let split = root.half_split();
        let mut new_root: Box<Node<V, ORDER>> = Node::new_internal();

        #[cfg(test)]
        self.hooks.before_root_latch();

        let Some(guard) = root.version().try_lock_at(version) else {
            self.stats.record_latch_failure();
            return None;
        };

        if self.root.load(ROOT_LOAD) != root_ptr {
            return None;
        }

        let separator: u64 = split.separator;
        let right: *mut Node<V, ORDER> = alloc::publish(split.right);
        new_root.init_root(separator, root_ptr, right);
        let new_root_ptr: *mut Node<V, ORDER> = alloc::publish(new_root);

        root.truncate_locked(&guard, split.left_size, separator, right);
        self.root.store(new_root_ptr, ROOT_PUBLISH);
        drop(guard);

        self.stats.record_root_growth();
        debug_log!(separator, leaf = root.is_leaf(), "root grown");

        // SAFETY: just published.
        Some(unsafe { &*new_root_ptr })
    }

    // ========================================================================
    //  Lookup
    // ========================================================================

    /// Value stored under exactly `key`, if any.
    ///
    /// With duplicate keys the most recently inserted slot wins.
    #[must_use]
    pub fn search(&self, key: u64) -> Option<&V> {
        let ptr: *mut V = self.root_node().search(key, &self.stats);

        // SAFETY: values are freed only when the tree drops, and the result
        // borrows from `self`.
        unsafe { ptr.as_ref() }
    }

    /// Whether any slot holds `key`.
    #[must_use]
    pub fn contains_key(&self, key: u64) -> bool {
        self.search(key).is_some()
    }

    // ========================================================================
    //  Introspection
    // ========================================================================

    /// Number of committed inserts, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(RELAXED)
    }

    /// Whether no insert has committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of levels, counting the leaf level. An empty tree has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut node: &Node<V, ORDER> = self.root_node();
        let mut height: usize = 1;

        while let Some(child) = node.child_node(0) {
            node = child;
            height += 1;
        }

        height
    }

    /// Current root node.
    #[must_use]
    pub fn root_node(&self) -> &Node<V, ORDER> {
        // SAFETY: the root pointer always refers to a published node that
        // lives as long as `self`.
        unsafe { &*self.root.load(ROOT_LOAD) }
    }

    /// Protocol counters.
    #[must_use]
    pub const fn stats(&self) -> &TreeStats {
        &self.stats
    }
}

impl<V, const ORDER: usize> Default for BLinkTree<V, ORDER> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, const ORDER: usize> StdFmt::Debug for BLinkTree<V, ORDER> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BLinkTree")
            .field("order", &ORDER)
            .field("len", &self.len())
            .field("height", &self.height())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl<V, const ORDER: usize> Drop for BLinkTree<V, ORDER> {
    fn drop(&mut self) {
        // `&mut self`: no reader or writer can still be inside the tree.
        let root: *mut Node<V, ORDER> = *self.root.get_mut();

        // SAFETY: every node was published by this tree and every live value
        // slot holds a `Box::into_raw` pointer.
        unsafe { alloc::teardown_tree(root) };
    }
}
