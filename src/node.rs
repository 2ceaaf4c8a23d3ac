//! Filepath: src/node.rs
//!
//! B-link tree node: the unit of storage and latching.
//!
//! A node owns an ordered key array plus either child links (internal) or
//! value handles (leaf), a right-sibling link, a high-key bound, and a
//! [`NodeVersion`] latch. Leaf and internal nodes share one type; the
//! [`NodeBody`] tag is chosen at construction and never changes.
//!
//! # Routing Model
//!
//! ```text
//!         [K0 | K1 | K2]           <- internal node (3 keys, 4 children)
//!        /    |    |    \
//!    C0     C1    C2     C3        <- children, linked C0 -> C1 -> C2 -> C3
//!
//!    C0: keys < K0            (C0.high_key == K0)
//!    C1: keys >= K0 and < K1  (C1.high_key == K1)
//!    C2: keys >= K1 and < K2  (C2.high_key == K2)
//!    C3: keys >= K2           (C3.high_key == node.high_key)
//! ```
//!
//! A key `>= high_key` on a node with a right sibling belongs to the sibling
//! ("move right"). `high_key` is meaningless while `next` is null.
//!
//! # Thread Safety
//!
//! Every field is atomic. Optimistic readers load fields with `Acquire`
//! between `stable()` and `has_changed()`. Writers only store into a
//! published node while holding its latch, and every such method takes the
//! [`LockGuard`] as proof. Unpublished nodes (speculative split products)
//! are initialised through `&mut self`.

use std::fmt as StdFmt;
use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize};

use crate::nodeversion::{LockGuard, NodeVersion};
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};

pub(crate) mod insert;
pub(crate) mod search;
pub(crate) mod split;

pub(crate) use insert::InsertOutcome;
pub use split::HalfSplit;

// ============================================================================
//  NodeBody
// ============================================================================

/// Payload of a node, fixed at construction.
///
/// - `Leaf`: `MAX_FANOUT` value slots; slot `i` pairs with `keys[i]`.
/// - `Internal`: `MAX_FANOUT + 1` child slots; `size + 1` are populated.
pub enum NodeBody<V, const ORDER: usize> {
    /// Value handles of a leaf.
    Leaf(Box<[AtomicPtr<V>]>),

    /// Child links of an internal node.
    Internal(Box<[AtomicPtr<Node<V, ORDER>>]>),
}

// ============================================================================
//  Node
// ============================================================================

/// A node of the B-link tree.
///
/// # Type Parameters
/// * `V` - Value type. Leaves store `*mut V` handles owned by the tree.
/// * `ORDER` - Minimum fanout. Nodes hold at most `2 * ORDER - 1` keys.
///
/// # Invariants (at quiescence)
/// - `keys[0..size]` strictly ascending.
/// - Internal: `keys[i] == children[i].high_key` and
///   `children[i].next == children[i + 1]` for `i < size`.
/// - With a right sibling: `high_key == children[size].high_key` (internal).
/// - `size <= MAX_FANOUT`.
pub struct Node<V, const ORDER: usize> {
    /// Versioned latch.
    version: NodeVersion,

    /// Populated key slots.
    size: AtomicUsize,

    /// Exclusive upper bound of this subtree; valid while `next` is set.
    high_key: AtomicU64,

    /// Right sibling on the same level, or null for the rightmost node.
    next: AtomicPtr<Self>,

    /// Sorted keys, `MAX_FANOUT` slots.
    keys: Box<[AtomicU64]>,

    /// Values or children.
    body: NodeBody<V, ORDER>,
}

impl<V, const ORDER: usize> StdFmt::Debug for Node<V, ORDER> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Node")
            .field("is_leaf", &self.is_leaf())
            .field("size", &self.size())
            .field("keys", &self.keys_snapshot())
            .field("high_key", &self.high_key())
            .field("has_next", &(!self.next().is_null()))
            .field("version", &self.version.value())
            .finish_non_exhaustive()
    }
}

impl<V, const ORDER: usize> Node<V, ORDER> {
    /// Minimum fanout.
    pub const MIN_FANOUT: usize = ORDER;

    /// Key capacity of every node.
    pub const MAX_FANOUT: usize = 2 * ORDER - 1;

    const ORDER_CHECK: () = assert!(ORDER >= 2, "ORDER (minimum fanout) must be at least 2");

    fn with_body(body: NodeBody<V, ORDER>) -> Box<Self> {
        // Trigger compile-time ORDER check
        let _: () = Self::ORDER_CHECK;

        Box::new(Self {
            version: NodeVersion::new(),
            size: AtomicUsize::new(0),
            high_key: AtomicU64::new(0),
            next: AtomicPtr::new(StdPtr::null_mut()),
            keys: (0..Self::MAX_FANOUT).map(|_| AtomicU64::new(0)).collect(),
            body,
        })
    }

    /// Create an empty leaf.
    #[must_use]
    pub fn new_leaf() -> Box<Self> {
        Self::with_body(NodeBody::Leaf(
            (0..Self::MAX_FANOUT)
                .map(|_| AtomicPtr::new(StdPtr::null_mut()))
                .collect(),
        ))
    }

    /// Create an empty internal node.
    #[must_use]
    pub fn new_internal() -> Box<Self> {
        Self::with_body(NodeBody::Internal(
            (0..=Self::MAX_FANOUT)
                .map(|_| AtomicPtr::new(StdPtr::null_mut()))
                .collect(),
        ))
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// The node's latch.
    #[must_use]
    #[inline(always)]
    pub const fn version(&self) -> &NodeVersion {
        &self.version
    }

    /// Whether this node is a leaf. Never changes.
    #[must_use]
    #[inline(always)]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    /// The node's payload.
    #[must_use]
    #[inline(always)]
    pub const fn body(&self) -> &NodeBody<V, ORDER> {
        &self.body
    }

    /// Number of populated key slots, clamped to capacity.
    #[must_use]
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size.load(READ_ORD).min(Self::MAX_FANOUT)
    }

    /// Populated key slots as stored, without clamping. Only the validator
    /// needs this.
    #[must_use]
    pub(crate) fn raw_size(&self) -> usize {
        self.size.load(READ_ORD)
    }

    /// Whether the node must be split before it can take another key.
    #[must_use]
    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.size() >= Self::MAX_FANOUT
    }

    /// Key at slot `i`.
    #[must_use]
    #[inline(always)]
    pub fn key(&self, i: usize) -> u64 {
        self.keys[i].load(READ_ORD)
    }

    /// Copy of `keys[0..size]`. Only consistent on a quiescent node.
    #[must_use]
    pub fn keys_snapshot(&self) -> Vec<u64> {
        (0..self.size()).map(|i| self.key(i)).collect()
    }

    /// Exclusive upper bound. Meaningful only while `next()` is non-null.
    #[must_use]
    #[inline(always)]
    pub fn high_key(&self) -> u64 {
        self.high_key.load(READ_ORD)
    }

    /// Right sibling, or null.
    #[must_use]
    #[inline(always)]
    pub fn next(&self) -> *mut Self {
        self.next.load(READ_ORD)
    }

    /// Right sibling as a reference.
    #[must_use]
    pub fn next_node(&self) -> Option<&Self> {
        // SAFETY: published nodes are never freed while the tree that owns
        // this node is alive, and `self` borrows from that tree.
        unsafe { self.next().as_ref() }
    }

    /// Child link at slot `i`, or null for leaves and unpopulated slots.
    #[must_use]
    #[inline(always)]
    pub fn child(&self, i: usize) -> *mut Self {
        match &self.body {
            NodeBody::Internal(children) => children[i].load(READ_ORD),
            NodeBody::Leaf(_) => StdPtr::null_mut(),
        }
    }

    /// Child at slot `i` as a reference.
    #[must_use]
    pub fn child_node(&self, i: usize) -> Option<&Self> {
        // SAFETY: see `next_node`.
        unsafe { self.child(i).as_ref() }
    }

    /// Value handle at slot `i`, or null for internal nodes.
    #[must_use]
    #[inline(always)]
    pub fn value_ptr(&self, i: usize) -> *mut V {
        match &self.body {
            NodeBody::Leaf(values) => values[i].load(READ_ORD),
            NodeBody::Internal(_) => StdPtr::null_mut(),
        }
    }

    // ========================================================================
    //  Routing
    // ========================================================================

    /// Number of keys in `keys[0..size]` that are `<= key`.
    ///
    /// For internal nodes this is the child slot covering `key`. For leaves it
    /// is the insertion point after any equal keys.
    #[must_use]
    #[inline]
    pub fn upper_bound(&self, key: u64, size: usize) -> usize {
        let mut lo: usize = 0;
        let mut hi: usize = size.min(Self::MAX_FANOUT);

        while lo < hi {
            let mid: usize = lo + (hi - lo) / 2;
            if self.keys[mid].load(READ_ORD) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        lo
    }

    /// Right sibling to forward `key` to, if `key` lies beyond this node.
    ///
    /// Unvalidated: the caller checks its version snapshot before trusting it.
    #[inline]
    pub(crate) fn move_right_target(&self, key: u64) -> Option<*mut Self> {
        let next: *mut Self = self.next();
        (!next.is_null() && key >= self.high_key()).then_some(next)
    }

    // ========================================================================
    //  Latched Mutation (published nodes)
    // ========================================================================

    /// Shift-and-insert `key`/`value` into a leaf.
    ///
    /// Caller must have verified `size < MAX_FANOUT` under the same version
    /// the guard was taken at.
    pub(crate) fn insert_entry_locked(&self, _guard: &LockGuard<'_>, key: u64, value: *mut V) {
        let NodeBody::Leaf(values) = &self.body else {
            debug_assert!(false, "insert_entry_locked on internal node");
            return;
        };

        let size: usize = self.size.load(RELAXED);
        debug_assert!(size < Self::MAX_FANOUT, "insert into full leaf");

        let pos: usize = self.upper_bound(key, size);

        for i in (pos..size).rev() {
            self.keys[i + 1].store(self.keys[i].load(RELAXED), WRITE_ORD);
            values[i + 1].store(values[i].load(RELAXED), WRITE_ORD);
        }

        self.keys[pos].store(key, WRITE_ORD);
        values[pos].store(value, WRITE_ORD);
        self.size.store(size + 1, WRITE_ORD);
    }

    /// Insert separator `separator` at slot `idx` with `right` as the child
    /// just after it.
    pub(crate) fn insert_separator_locked(
        &self,
        _guard: &LockGuard<'_>,
        idx: usize,
        separator: u64,
        right: *mut Self,
    ) {
        let NodeBody::Internal(children) = &self.body else {
            debug_assert!(false, "insert_separator_locked on leaf");
            return;
        };

        let size: usize = self.size.load(RELAXED);
        debug_assert!(size < Self::MAX_FANOUT, "separator into full node");
        debug_assert!(idx <= size, "separator slot out of range");

        for i in (idx..size).rev() {
            self.keys[i + 1].store(self.keys[i].load(RELAXED), WRITE_ORD);
        }
        for i in ((idx + 1)..=size).rev() {
            children[i + 1].store(children[i].load(RELAXED), WRITE_ORD);
        }

        self.keys[idx].store(separator, WRITE_ORD);
        children[idx + 1].store(right, WRITE_ORD);
        self.size.store(size + 1, WRITE_ORD);
    }

    /// Shrink to the left half of a split and link the new right sibling.
    pub(crate) fn truncate_locked(
        &self,
        _guard: &LockGuard<'_>,
        left_size: usize,
        separator: u64,
        right: *mut Self,
    ) {
        self.high_key.store(separator, WRITE_ORD);
        self.next.store(right, WRITE_ORD);
        self.size.store(left_size, WRITE_ORD);
    }

    // ========================================================================
    //  Unpublished Initialisation
    // ========================================================================

    /// Make this fresh internal node a root over `left` and `right`.
    pub(crate) fn init_root(&mut self, separator: u64, left: *mut Self, right: *mut Self) {
        let NodeBody::Internal(children) = &mut self.body else {
            debug_assert!(false, "init_root on leaf");
            return;
        };

        *children[0].get_mut() = left;
        *children[1].get_mut() = right;
        *self.keys[0].get_mut() = separator;
        *self.size.get_mut() = 1;
    }
}
