//! Latch-then-mutate insert with move-right and child half-split.
//!
//! # Protocol
//!
//! ```text
//! loop at node:
//!   v = node.version.stable()
//!   key >= high_key && next   -> validate v, move right
//!   node full                 -> bounce to the parent we came from
//!                                (no parent: report Retry to the tree)
//!   leaf                      -> try_lock_at(v), shift-insert, done
//!   internal                  -> idx = upper_bound(key), child = children[idx]
//!       child full            -> half-split child: latch child, then node
//!                                (both at their snapshots), shrink child,
//!                                add separator to node, descend into the
//!                                half covering key
//!       otherwise             -> validate node and child, descend
//! ```
//!
//! Latches are only ever taken with `try_lock_at`, child before parent.
//! A failed attempt drops whatever is held and restarts at the current node,
//! so no thread ever waits on a latch while holding another.

use crate::alloc;
use crate::backoff::Backoff;
use crate::tracing_helpers::{debug_log, trace_log};
use crate::tree::stats::TreeStats;

use super::{Node, NodeBody};

/// Result of a node-level insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertOutcome {
    /// The entry is in a leaf and visible to readers.
    Inserted,

    /// The subtree root is full. Only the caller can split it; nothing was
    /// written.
    Retry,
}

impl<V, const ORDER: usize> Node<V, ORDER> {
    /// Insert `key` with value handle `value` into the subtree under `self`.
    ///
    /// Full nodes met on the way are split by their parent before the insert
    /// descends into them. If `self` itself is full (or the insert is bounced
    /// back up to it) the attempt reports [`InsertOutcome::Retry`].
    pub(crate) fn insert(&self, key: u64, value: *mut V, stats: &TreeStats) -> InsertOutcome {
        let mut node: &Self = self;
        let mut ancestors: Vec<&Self> = Vec::new();
        let mut backoff = Backoff::new();

        loop {
            let version: u64 = node.version.stable();

            // 1. Move right past a concurrent split.
            if let Some(next) = node.move_right_target(key) {
                if node.version.has_changed(version) {
                    stats.record_write_restart();
                    backoff.snooze();
                    continue;
                }

                stats.record_move_right();
                // SAFETY: published nodes live as long as the tree.
                node = unsafe { &*next };
                continue;
            }

            // 2. A full node can only be fixed by its parent.
            if node.is_full() {
                stats.record_ancestor_bounce();

                let Some(parent) = ancestors.pop() else {
                    trace_log!(key, "insert reached a full subtree root");
                    return InsertOutcome::Retry;
                };

                node = parent;
                continue;
            }

            match &node.body {
                // 3. Leaf: latch at the snapshot and insert.
                NodeBody::Leaf(_) => {
                    let Some(guard) = node.version.try_lock_at(version) else {
                        stats.record_latch_failure();
                        backoff.snooze();
                        continue;
                    };

                    node.insert_entry_locked(&guard, key, value);
                    return InsertOutcome::Inserted;
                }

                // 4./5. Internal: split a full child first, then descend.
                NodeBody::Internal(_) => {
                    let idx: usize = node.upper_bound(key, node.size());
                    let child_ptr: *mut Self = node.child(idx);

                    if node.version.has_changed(version) {
                        stats.record_write_restart();
                        backoff.snooze();
                        continue;
                    }

                    // SAFETY: validated slot of a published internal node.
                    let child: &Self = unsafe { &*child_ptr };
                    let child_version: u64 = child.version.stable();

                    if child.is_full() {
                        let Some((right, separator)) =
                            node.split_child(version, idx, child, child_version, stats)
                        else {
                            stats.record_latch_failure();
                            backoff.snooze();
                            continue;
                        };

                        ancestors.push(node);
                        node = if key >= separator { right } else { child };
                        backoff.reset();
                        continue;
                    }

                    if node.version.has_changed(version) || child.version.has_changed(child_version)
                    {
                        stats.record_write_restart();
                        backoff.snooze();
                        continue;
                    }

                    ancestors.push(node);
                    node = child;
                    backoff.reset();

                    #[cfg(test)]
                    crate::tree::test_hooks::after_descend();
                }
            }
        }
    }

    /// Half-split `child` (at `children[idx]` of `self`) and install the new
    /// right sibling.
    ///
    /// `version` and `child_version` are the snapshots under which `idx` and
    /// the child's fullness were observed. Returns the right half and the
    /// separator, or `None` if either latch attempt lost a race.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip(self, child, stats))
    )]
    fn split_child<'a>(
        &'a self,
        version: u64,
        idx: usize,
        child: &'a Self,
        child_version: u64,
        stats: &TreeStats,
    ) -> Option<(&'a Self, u64)> {
        // Speculative copy; discarded if either latch fails.
        let split = child.half_split();

        let child_guard = child.version.try_lock_at(child_version)?;
        let parent_guard = self.version.try_lock_at(version)?;

        let separator: u64 = split.separator;
        let right: *mut Self = alloc::publish(split.right);

        // Sibling link first: a reader that passes the shrunk child before
        // the parent is updated still finds the upper half by moving right.
        child.truncate_locked(&child_guard, split.left_size, separator, right);
        drop(child_guard);

        self.insert_separator_locked(&parent_guard, idx, separator, right);
        drop(parent_guard);

        if child.is_leaf() {
            stats.record_leaf_split();
        } else {
            stats.record_internal_split();
        }

        debug_log!(
            separator,
            idx,
            leaf = child.is_leaf(),
            "half-split child installed"
        );

        // SAFETY: just published; lives as long as the tree.
        Some((unsafe { &*right }, separator))
    }
}
