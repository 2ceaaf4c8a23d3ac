//! Whole-tree invariant checker.
//!
//! Single-threaded: call only when no insert is in flight. Validation walks
//! the tree depth-first, carrying the key range each subtree may hold, and
//! records every level's nodes in left-to-right order so the sibling chains
//! can be compared against the child arrays afterwards.

use std::fmt as StdFmt;

use crate::node::{Node, NodeBody};
use crate::tracing_helpers::warn_log;

use super::BLinkTree;

// ============================================================================
//  InvariantViolation
// ============================================================================

/// First structural defect found by [`BLinkTree::validate`].
///
/// `level` counts from the root (level 0) downwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A node reports more keys than it can hold.
    SizeOverflow {
        /// Depth of the node.
        level: usize,
        /// Reported size.
        size: usize,
    },

    /// `keys[index] >= keys[index + 1]`.
    KeysNotAscending {
        /// Depth of the node.
        level: usize,
        /// Position of the first out-of-order pair.
        index: usize,
    },

    /// A key lies outside the range its parent routes to this node.
    KeyOutOfRange {
        /// Depth of the node.
        level: usize,
        /// Offending key.
        key: u64,
    },

    /// An internal node has a null child in `children[0..=size]`.
    MissingChild {
        /// Depth of the internal node.
        level: usize,
        /// Empty child slot.
        index: usize,
    },

    /// `keys[index] != children[index].high_key`.
    SeparatorMismatch {
        /// Depth of the internal node.
        level: usize,
        /// Separator slot.
        index: usize,
    },

    /// `children[index].next != children[index + 1]`.
    SiblingMismatch {
        /// Depth of the internal node.
        level: usize,
        /// Child whose sibling link is wrong.
        index: usize,
    },

    /// A node's `high_key` disagrees with the bound its parent gives it,
    /// or a node without a right sibling is not the rightmost of its level.
    HighKeyMismatch {
        /// Depth of the node.
        level: usize,
    },

    /// A node is a leaf at the wrong depth, or an internal node sits at the
    /// leaf depth.
    UnbalancedLeaf {
        /// Depth of the offending node.
        depth: usize,
        /// Depth of the first leaf found.
        expected: usize,
    },

    /// Following `next` from the leftmost node of a level does not visit the
    /// level's nodes in child order.
    LevelChainBroken {
        /// Level whose chain diverges.
        level: usize,
        /// Position along the chain where it diverges.
        position: usize,
    },

    /// The last node of a level has a right sibling.
    LevelChainNotTerminated {
        /// Level with the dangling link.
        level: usize,
    },

    /// Two consecutive leaf keys do not differ by the requested step.
    ProgressionGap {
        /// Earlier key.
        previous: u64,
        /// Later key.
        key: u64,
        /// Requested step.
        step: u64,
    },

    /// The leaves hold a different number of entries than were inserted.
    CountMismatch {
        /// Entries found in the leaves.
        counted: usize,
        /// Committed inserts.
        expected: usize,
    },
}

impl StdFmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::SizeOverflow { level, size } => {
                write!(f, "node at level {level} has size {size} above capacity")
            }

            Self::KeysNotAscending { level, index } => {
                write!(f, "keys not ascending at slot {index} (level {level})")
            }

            Self::KeyOutOfRange { level, key } => {
                write!(f, "key {key} outside its routed range (level {level})")
            }

            Self::MissingChild { level, index } => {
                write!(f, "missing child {index} (level {level})")
            }

            Self::SeparatorMismatch { level, index } => {
                write!(
                    f,
                    "separator {index} differs from child high key (level {level})"
                )
            }

            Self::SiblingMismatch { level, index } => {
                write!(
                    f,
                    "child {index} does not link to child {} (level {level})",
                    index + 1
                )
            }

            Self::HighKeyMismatch { level } => {
                write!(f, "high key disagrees with parent bound (level {level})")
            }

            Self::UnbalancedLeaf { depth, expected } => {
                write!(f, "leaf depth {depth}, expected {expected}")
            }

            Self::LevelChainBroken { level, position } => {
                write!(f, "sibling chain of level {level} diverges at {position}")
            }

            Self::LevelChainNotTerminated { level } => {
                write!(f, "last node of level {level} has a right sibling")
            }

            Self::ProgressionGap {
                previous,
                key,
                step,
            } => {
                write!(f, "leaf keys {previous} -> {key} do not step by {step}")
            }

            Self::CountMismatch { counted, expected } => {
                write!(f, "found {counted} entries, expected {expected}")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

// ============================================================================
//  Walk state
// ============================================================================

/// Half-open key range `[lower, upper)` a subtree may hold. `None` is
/// unbounded.
#[derive(Clone, Copy)]
struct Bounds {
    lower: Option<u64>,
    upper: Option<u64>,
}

struct Walk<'a, V, const ORDER: usize> {
    /// Nodes of each level in child-array order.
    levels: Vec<Vec<&'a Node<V, ORDER>>>,
    leaf_depth: Option<usize>,
    previous_key: Option<u64>,
    step: u64,
    entries: usize,
}

impl<'a, V, const ORDER: usize> Walk<'a, V, ORDER> {
    fn visit(
        &mut self,
        node: &'a Node<V, ORDER>,
        level: usize,
        bounds: Bounds,
    ) -> Result<(), InvariantViolation> {
        if self.levels.len() <= level {
            self.levels.push(Vec::new());
        }
        self.levels[level].push(node);

        Self::check_node(node, level, bounds)?;

        let size: usize = node.size();

        match node.body() {
            NodeBody::Leaf(_) => {
                match self.leaf_depth {
                    None => self.leaf_depth = Some(level),
                    Some(expected) if expected != level => {
                        return Err(InvariantViolation::UnbalancedLeaf {
                            depth: level,
                            expected,
                        });
                    }
                    Some(_) => {}
                }

                for i in 0..size {
                    self.visit_leaf_key(node.key(i))?;
                }
                self.entries += size;
            }

            NodeBody::Internal(_) => {
                if let Some(expected) = self.leaf_depth
                    && level >= expected
                {
                    return Err(InvariantViolation::UnbalancedLeaf {
                        depth: level,
                        expected,
                    });
                }

                let mut children: Vec<&'a Node<V, ORDER>> = Vec::with_capacity(size + 1);
                for index in 0..=size {
                    let child: &'a Node<V, ORDER> = node
                        .child_node(index)
                        .ok_or(InvariantViolation::MissingChild { level, index })?;
                    children.push(child);
                }

                for index in 0..size {
                    if node.key(index) != children[index].high_key() {
                        return Err(InvariantViolation::SeparatorMismatch { level, index });
                    }
                    if children[index].next() != node.child(index + 1) {
                        return Err(InvariantViolation::SiblingMismatch { level, index });
                    }
                }

                if !node.next().is_null() && node.high_key() != children[size].high_key() {
                    return Err(InvariantViolation::HighKeyMismatch { level });
                }

                for (index, child) in children.into_iter().enumerate() {
                    let child_bounds = Bounds {
                        lower: if index == 0 {
                            bounds.lower
                        } else {
                            Some(node.key(index - 1))
                        },
                        upper: if index == size {
                            bounds.upper
                        } else {
                            Some(node.key(index))
                        },
                    };
                    self.visit(child, level + 1, child_bounds)?;
                }
            }
        }

        Ok(())
    }

    /// Checks local to one node: capacity, ordering, range, and bound.
    fn check_node(
        node: &Node<V, ORDER>,
        level: usize,
        bounds: Bounds,
    ) -> Result<(), InvariantViolation> {
        let raw_size: usize = node.raw_size();
        if raw_size > Node::<V, ORDER>::MAX_FANOUT {
            return Err(InvariantViolation::SizeOverflow {
                level,
                size: raw_size,
            });
        }

        let keys: Vec<u64> = node.keys_snapshot();

        if let Some(index) = keys.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(InvariantViolation::KeysNotAscending { level, index });
        }

        if let Some(&key) = keys.iter().find(|&&key| {
            bounds.lower.is_some_and(|lower| key < lower)
                || bounds.upper.is_some_and(|upper| key >= upper)
        }) {
            return Err(InvariantViolation::KeyOutOfRange { level, key });
        }

        let bound_matches: bool = if node.next().is_null() {
            bounds.upper.is_none()
        } else {
            bounds.upper == Some(node.high_key())
        };
        if !bound_matches {
            return Err(InvariantViolation::HighKeyMismatch { level });
        }

        Ok(())
    }

    fn visit_leaf_key(&mut self, key: u64) -> Result<(), InvariantViolation> {
        if self.step > 0
            && let Some(previous) = self.previous_key
            && previous.checked_add(self.step) != Some(key)
        {
            return Err(InvariantViolation::ProgressionGap {
                previous,
                key,
                step: self.step,
            });
        }

        self.previous_key = Some(key);
        Ok(())
    }

    /// Each level must be one `next`-linked list in child order, ending in
    /// null.
    fn check_level_chains(&self) -> Result<(), InvariantViolation> {
        for (level, nodes) in self.levels.iter().enumerate() {
            for (position, pair) in nodes.windows(2).enumerate() {
                if !std::ptr::eq(pair[0].next().cast_const(), pair[1]) {
                    return Err(InvariantViolation::LevelChainBroken { level, position });
                }
            }

            if nodes.last().is_some_and(|last| !last.next().is_null()) {
                return Err(InvariantViolation::LevelChainNotTerminated { level });
            }
        }

        Ok(())
    }
}

// ============================================================================
//  BLinkTree API
// ============================================================================

impl<V, const ORDER: usize> BLinkTree<V, ORDER> {
    /// Validate every structural invariant.
    ///
    /// With `increase_by > 0`, additionally require the leaf keys, read in
    /// order, to form an arithmetic progression with that step.
    ///
    /// # Errors
    /// Returns the first [`InvariantViolation`] found.
    pub fn validate(&self, increase_by: u64) -> Result<(), InvariantViolation> {
        let mut walk: Walk<'_, V, ORDER> = Walk {
            levels: Vec::new(),
            leaf_depth: None,
            previous_key: None,
            step: increase_by,
            entries: 0,
        };

        let unbounded = Bounds {
            lower: None,
            upper: None,
        };
        walk.visit(self.root_node(), 0, unbounded)?;
        walk.check_level_chains()?;

        let expected: usize = self.len();
        if walk.entries != expected {
            return Err(InvariantViolation::CountMismatch {
                counted: walk.entries,
                expected,
            });
        }

        Ok(())
    }

    /// Whether [`validate`](Self::validate) passes.
    #[must_use]
    pub fn check(&self, increase_by: u64) -> bool {
        self.validate(increase_by)
            .inspect_err(|_violation| {
                warn_log!(violation = %_violation, "invariant check failed");
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::ptr as StdPtr;

    use super::*;

    type SmallTree = BLinkTree<u64, 3>;

    fn dense_tree(n: u64) -> SmallTree {
        let tree: SmallTree = BLinkTree::new();
        for key in 0..n {
            tree.insert(key, key);
        }
        tree
    }

    #[test]
    fn test_valid_tree_passes() {
        let tree = dense_tree(300);
        assert_eq!(tree.validate(1), Ok(()));
        assert_eq!(tree.validate(0), Ok(()));
    }

    #[test]
    fn test_progression_gap_reported() {
        let tree: SmallTree = BLinkTree::new();
        for key in [0, 2, 4, 7] {
            tree.insert(key, key);
        }

        assert_eq!(
            tree.validate(2),
            Err(InvariantViolation::ProgressionGap {
                previous: 4,
                key: 7,
                step: 2
            })
        );
        assert!(tree.check(0));
    }

    #[test]
    fn test_duplicates_fail_ascending_check() {
        let tree: SmallTree = BLinkTree::new();
        tree.insert(1, 1);
        tree.insert(1, 2);

        assert_eq!(
            tree.validate(0),
            Err(InvariantViolation::KeysNotAscending { level: 0, index: 0 })
        );
    }

    #[test]
    fn test_broken_sibling_link_detected() {
        let tree = dense_tree(6);
        let root = tree.root_node();

        // Cut the leaf level chain.
        if let Some(left) = root.child_node(0) {
            let guard = left.version().lock();
            left.truncate_locked(&guard, left.size(), left.high_key(), StdPtr::null_mut());
        }

        assert!(matches!(
            tree.validate(1),
            Err(InvariantViolation::SiblingMismatch { level: 0, index: 0 })
        ));
        assert!(!tree.check(1));

        // Restore so teardown sees a consistent tree.
        if let Some(left) = root.child_node(0) {
            let guard = left.version().lock();
            left.truncate_locked(&guard, left.size(), left.high_key(), root.child(1));
        }
        assert!(tree.check(1));
    }

    #[test]
    fn test_count_mismatch_detected() {
        let tree = dense_tree(10);
        tree.count.fetch_add(1, crate::ordering::RELAXED);

        assert_eq!(
            tree.validate(1),
            Err(InvariantViolation::CountMismatch {
                counted: 10,
                expected: 11
            })
        );
    }

    #[test]
    fn test_display() {
        let violation = InvariantViolation::SiblingMismatch { level: 2, index: 3 };
        assert_eq!(
            violation.to_string(),
            "child 3 does not link to child 4 (level 2)"
        );
    }
}
