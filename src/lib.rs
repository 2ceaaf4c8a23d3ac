//! # `blinktree`
//!
//! A concurrent B-link tree: a B+tree whose nodes carry a right-sibling link
//! and a high-key bound, so a split becomes visible through the sibling chain
//! before the parent learns about it.
//!
//! ## Status
//!
//! | Feature | Status |
//! |---------|--------|
//! | Concurrent search | Works (latch-free, version-validated) |
//! | Concurrent insert | Works (per-node latches, child-then-parent) |
//! | Split propagation | Works (top-down half-split, move right) |
//! | Ordered iteration | Works (leaf chain, weakly consistent) |
//! | Memory reclamation | Nodes and values freed on tree drop only |
//! | Deletion | Not supported |
//!
//! ## Thread Safety
//!
//! `BLinkTree<V>` is `Send + Sync` when `V: Send + Sync`. Every operation
//! takes `&self`:
//!
//! ```rust
//! use std::thread;
//! use blinktree::BLinkTree;
//!
//! let tree: BLinkTree<u64> = BLinkTree::new();
//!
//! thread::scope(|s| {
//!     for t in 0..4 {
//!         let tree = &tree;
//!         s.spawn(move || {
//!             for i in 0..1_000 {
//!                 let key = i * 4 + t;
//!                 tree.insert(key, key * 10);
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(tree.len(), 4_000);
//! assert_eq!(tree.search(17), Some(&170));
//! assert!(tree.check(1));
//! ```
//!
//! ## Design
//!
//! Each node has a versioned latch ([`nodeversion::NodeVersion`]). Readers
//! snapshot the version, read, and validate; a failed validation restarts at
//! the same node, never at the root. Writers take the latch with one CAS at
//! the version they read. A key at or beyond a node's high key is forwarded
//! to the right sibling ("move right"), which is how an operation that raced
//! with a split still finds its key.
//!
//! Full nodes are split top-down: the parent splits a full child before
//! descending into it, so no split ever has to climb. The root has no parent,
//! so [`BLinkTree::insert`] grows the tree by publishing a new root over the
//! old root's two halves.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Hot accessors are marked #[inline(always)] deliberately.
#![allow(clippy::inline_always)]

pub mod alloc;
pub mod backoff;
pub mod node;
pub mod nodeversion;
pub mod ordering;
pub mod tree;

mod tracing_helpers;

pub use node::{Node, NodeBody};
pub use tree::{BLinkTree, InvariantViolation, Iter, StatsSnapshot, TreeStats};
