//! Node publication and tree teardown.
//!
//! Nodes are never reclaimed while the tree is alive: a reader holding a
//! stale root or parent pointer can always keep walking. Once a node is
//! published it is owned by the tree, and the whole structure is freed in
//! one pass when the tree drops.
//!
//! # Ownership at teardown
//!
//! - Every published node is reachable from the root through `children`
//!   links. Splits install the right half into the parent under the same
//!   latch pair that shrinks the left half; root growth makes both halves
//!   children of the new root.
//! - A leaf owns the values in `values[0..size]`. Slots past `size` are
//!   stale copies left behind by a split and belong to the right sibling.
//! - Sibling (`next`) links are never followed.

use std::collections::HashSet;

use crate::node::{Node, NodeBody};
use crate::ordering::RELAXED;

/// Hand a fully initialised node to the tree and return its stable address.
///
/// The pointer stays valid until [`teardown_tree`] runs.
#[inline]
#[must_use]
pub fn publish<V, const ORDER: usize>(node: Box<Node<V, ORDER>>) -> *mut Node<V, ORDER> {
    Box::into_raw(node)
}

/// Free every node and value reachable from `root`.
///
/// Performs an iterative DFS over child links with a visited set, so a
/// corrupted tree that shares a child between two parents is still freed
/// once.
///
/// # Safety
///
/// - `root` must be null or a node returned by [`publish`].
/// - No other thread may access the tree, now or later.
/// - Every value pointer in `values[0..size]` must come from `Box::into_raw`.
pub(crate) unsafe fn teardown_tree<V, const ORDER: usize>(root: *mut Node<V, ORDER>) {
    if root.is_null() {
        return;
    }

    let mut stack: Vec<*mut Node<V, ORDER>> = Vec::with_capacity(64);
    let mut visited: HashSet<usize> = HashSet::new();
    stack.push(root);

    while let Some(ptr) = stack.pop() {
        if ptr.is_null() || !visited.insert(ptr.addr()) {
            continue;
        }

        // SAFETY: `ptr` came from `publish` and has not been freed (visited set).
        let node: Box<Node<V, ORDER>> = unsafe { Box::from_raw(ptr) };
        let size: usize = node.size();

        match node.body() {
            NodeBody::Leaf(values) => {
                for slot in &values[..size] {
                    let value: *mut V = slot.load(RELAXED);
                    if !value.is_null() {
                        // SAFETY: live leaf slots own their boxed value.
                        drop(unsafe { Box::from_raw(value) });
                    }
                }
            }

            NodeBody::Internal(children) => {
                stack.extend(children[..=size].iter().map(|child| child.load(RELAXED)));
            }
        }
    }
}
