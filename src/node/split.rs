//! Half-split: copy the upper half of a full node into a fresh right sibling.
//!
//! The copy is speculative. It is built from unlatched reads, so it is only
//! meaningful if the caller then latches the source node at the version it
//! snapshotted before calling [`Node::half_split`]. If that latch fails the
//! [`HalfSplit`] is simply dropped; nothing it points to is owned by it.
//!
//! # Sizing
//!
//! With `MIN = ORDER` and `MAX = 2 * MIN - 1`:
//!
//! ```text
//! leaf:      [k0 .. k(MIN-1)] [kMIN .. k(MAX-1)]     separator = kMIN (copied up)
//!             MIN entries      MIN-1 entries
//!
//! internal:  [k0 .. k(MIN-2)] k(MIN-1) [kMIN .. k(MAX-1)]   separator = k(MIN-1) (moved up)
//!             MIN-1 keys,               MIN-1 keys,
//!             MIN children              MIN children
//! ```

use crate::ordering::READ_ORD;

use super::{Node, NodeBody};

/// A prepared split of a full node.
pub struct HalfSplit<V, const ORDER: usize> {
    /// Key promoted into the parent. Becomes the left half's `high_key`.
    pub separator: u64,

    /// Size the source node shrinks to.
    pub left_size: usize,

    /// Unpublished right sibling holding the upper half.
    pub right: Box<Node<V, ORDER>>,
}

impl<V, const ORDER: usize> std::fmt::Debug for HalfSplit<V, ORDER> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HalfSplit")
            .field("separator", &self.separator)
            .field("left_size", &self.left_size)
            .field("right", &self.right)
            .finish()
    }
}

impl<V, const ORDER: usize> Node<V, ORDER> {
    /// Build the right half of this (full) node.
    ///
    /// The sibling inherits this node's `high_key` and `next`, so installing
    /// it keeps the level's sibling chain intact.
    #[must_use]
    pub fn half_split(&self) -> HalfSplit<V, ORDER> {
        let min: usize = Self::MIN_FANOUT;
        let max: usize = Self::MAX_FANOUT;

        let (mut right, separator, left_size) = match &self.body {
            NodeBody::Leaf(values) => {
                let mut right: Box<Self> = Self::new_leaf();
                if let NodeBody::Leaf(right_values) = &mut right.body {
                    for (dst, src) in right_values.iter_mut().zip(&values[min..max]) {
                        *dst.get_mut() = src.load(READ_ORD);
                    }
                }
                (right, self.keys[min].load(READ_ORD), min)
            }

            NodeBody::Internal(children) => {
                let mut right: Box<Self> = Self::new_internal();
                if let NodeBody::Internal(right_children) = &mut right.body {
                    for (dst, src) in right_children.iter_mut().zip(&children[min..=max]) {
                        *dst.get_mut() = src.load(READ_ORD);
                    }
                }
                (right, self.keys[min - 1].load(READ_ORD), min - 1)
            }
        };

        for (dst, src) in right.keys.iter_mut().zip(&self.keys[min..max]) {
            *dst.get_mut() = src.load(READ_ORD);
        }

        *right.size.get_mut() = max - min;
        *right.high_key.get_mut() = self.high_key.load(READ_ORD);
        *right.next.get_mut() = self.next.load(READ_ORD);

        HalfSplit {
            separator,
            left_size,
            right,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ptr as StdPtr;

    use super::*;

    type TestNode = Node<u64, 3>;

    fn full_leaf(keys: [u64; 5]) -> Box<TestNode> {
        let leaf = TestNode::new_leaf();
        for key in keys {
            let guard = leaf.version().lock();
            leaf.insert_entry_locked(&guard, key, StdPtr::without_provenance_mut(key as usize));
        }
        leaf
    }

    #[test]
    fn test_leaf_split_sizes() {
        let leaf = full_leaf([10, 20, 30, 40, 50]);
        let split = leaf.half_split();

        assert_eq!(split.separator, 40);
        assert_eq!(split.left_size, 3);
        assert!(split.right.is_leaf());
        assert_eq!(split.right.keys_snapshot(), vec![40, 50]);
        assert_eq!(split.right.value_ptr(0).addr(), 40);
        assert_eq!(split.right.value_ptr(1).addr(), 50);
        assert!(split.right.next().is_null());

        // Source untouched until the caller applies the split.
        assert_eq!(leaf.size(), 5);
    }

    #[test]
    fn test_split_inherits_bound_and_sibling() {
        let leaf = full_leaf([1, 2, 3, 4, 5]);
        let sibling = StdPtr::without_provenance_mut::<TestNode>(0x80);
        let guard = leaf.version().lock();
        leaf.truncate_locked(&guard, 5, 9, sibling);
        drop(guard);

        let split = leaf.half_split();
        assert_eq!(split.right.high_key(), 9);
        assert_eq!(split.right.next(), sibling);
    }

    #[test]
    fn test_internal_split_promotes_median() {
        let mut node = TestNode::new_internal();
        let child = |n: usize| StdPtr::without_provenance_mut::<TestNode>(n * 0x10);
        node.init_root(10, child(0), child(1));
        for (i, key) in [20, 30, 40, 50].into_iter().enumerate() {
            let guard = node.version().lock();
            node.insert_separator_locked(&guard, i + 1, key, child(i + 2));
        }
        assert!(node.is_full());

        let split = node.half_split();

        assert_eq!(split.separator, 30);
        assert_eq!(split.left_size, 2);
        assert_eq!(split.right.keys_snapshot(), vec![40, 50]);
        assert_eq!(split.right.child(0), child(3));
        assert_eq!(split.right.child(1), child(4));
        assert_eq!(split.right.child(2), child(5));
    }
}
