//! Optimistic point search and leaf snapshots.
//!
//! # Protocol
//!
//! ```text
//! 1. v = node.version.stable()
//! 2. if key >= high_key and next != null: validate v, move right
//! 3. compute slot (upper bound), read child / value
//! 4. if node.version.has_changed(v): restart at this node
//! 5. leaf: return value; internal: continue at child
//! ```
//!
//! A restart never goes back to the root: a concurrent split only moves keys
//! to the right, and the move-right rule follows them there.

use std::ptr as StdPtr;

use crate::backoff::Backoff;
use crate::tree::stats::TreeStats;

use super::{Node, NodeBody};

impl<V, const ORDER: usize> Node<V, ORDER> {
    /// Find the value stored under exactly `key` in this subtree.
    ///
    /// Returns null when no slot holds `key`. With duplicate keys the most
    /// recently inserted slot in the covering leaf wins.
    pub(crate) fn search(&self, key: u64, stats: &TreeStats) -> *mut V {
        let mut node: &Self = self;
        let mut backoff = Backoff::new();

        loop {
            let version: u64 = node.version.stable();

            if let Some(next) = node.move_right_target(key) {
                if node.version.has_changed(version) {
                    stats.record_read_restart();
                    backoff.snooze();
                    continue;
                }

                stats.record_move_right();
                // SAFETY: published nodes live as long as the tree.
                node = unsafe { &*next };
                continue;
            }

            let size: usize = node.size();
            let slot: usize = node.upper_bound(key, size);

            match &node.body {
                NodeBody::Leaf(values) => {
                    let found: *mut V = if slot > 0 && node.key(slot - 1) == key {
                        values[slot - 1].load(crate::ordering::READ_ORD)
                    } else {
                        StdPtr::null_mut()
                    };

                    if node.version.has_changed(version) {
                        stats.record_read_restart();
                        backoff.snooze();
                        continue;
                    }

                    return found;
                }

                NodeBody::Internal(_) => {
                    let child: *mut Self = node.child(slot);

                    if node.version.has_changed(version) {
                        stats.record_read_restart();
                        backoff.snooze();
                        continue;
                    }

                    debug_assert!(!child.is_null(), "validated child slot is empty");
                    // SAFETY: validated slot of a published internal node.
                    node = unsafe { &*child };
                    backoff.reset();
                }
            }
        }
    }

    /// Copy a leaf's entries and its right-sibling link as of one validated
    /// version.
    ///
    /// Following the returned `next` after a concurrent split still lands on
    /// the node covering the keys after this snapshot, so a scan built from
    /// these snapshots never yields an entry twice.
    pub(crate) fn snapshot_leaf(&self, out: &mut Vec<(u64, *mut V)>) -> *mut Self {
        let mut backoff = Backoff::new();

        loop {
            out.clear();
            let version: u64 = self.version.stable();

            let size: usize = self.size();
            out.extend((0..size).map(|i| (self.key(i), self.value_ptr(i))));
            let next: *mut Self = self.next();

            if !self.version.has_changed(version) {
                return next;
            }

            backoff.snooze();
        }
    }

    /// Leftmost leaf of this subtree.
    ///
    /// Slot 0 of an internal node never changes once set: splits only move
    /// the upper half, and root growth keeps the old root as child 0.
    pub(crate) fn leftmost_leaf(&self) -> &Self {
        let mut node: &Self = self;

        while !node.is_leaf() {
            // SAFETY: slot 0 of a published internal node is always populated.
            node = unsafe { &*node.child(0) };
        }

        node
    }
}
