//! Ordered traversal over the leaf level.
//!
//! The leaf level is one `next`-linked list in key order, so every ordered
//! walk starts at the leftmost leaf and follows sibling links. Each leaf is
//! copied as of one validated version, together with the `next` link read
//! under that same version.

use std::fmt as StdFmt;
use std::io::{self, Write};
use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::node::Node;

use super::BLinkTree;

/// Ordered iterator over `(key, &value)` pairs.
///
/// Safe to use while other threads insert. Entries that exist for the whole
/// iteration are yielded exactly once and in key order; entries inserted
/// concurrently may or may not be seen.
pub struct Iter<'a, V, const ORDER: usize> {
    /// Next leaf to load, or null at the end of the level.
    leaf: *mut Node<V, ORDER>,

    /// Entries of the current leaf.
    buffer: Vec<(u64, *mut V)>,

    /// Next entry of `buffer` to yield.
    pos: usize,

    _tree: PhantomData<&'a BLinkTree<V, ORDER>>,
}

impl<'a, V, const ORDER: usize> Iterator for Iter<'a, V, ORDER> {
    type Item = (u64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(&(key, value)) = self.buffer.get(self.pos) {
                self.pos += 1;
                // SAFETY: values live until the tree drops; `'a` borrows it.
                return Some((key, unsafe { &*value }));
            }

            if self.leaf.is_null() {
                return None;
            }

            // SAFETY: published leaves live as long as the tree.
            let leaf: &Node<V, ORDER> = unsafe { &*self.leaf };
            self.leaf = leaf.snapshot_leaf(&mut self.buffer);
            self.pos = 0;
        }
    }
}

impl<V, const ORDER: usize> FusedIterator for Iter<'_, V, ORDER> {}

impl<V, const ORDER: usize> StdFmt::Debug for Iter<'_, V, ORDER> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Iter")
            .field("buffered", &(self.buffer.len() - self.pos.min(self.buffer.len())))
            .field("done", &self.leaf.is_null())
            .finish()
    }
}

impl<V, const ORDER: usize> BLinkTree<V, ORDER> {
    /// Iterate over all entries in key order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, V, ORDER> {
        let leftmost: &Node<V, ORDER> = self.root_node().leftmost_leaf();

        Iter {
            leaf: std::ptr::from_ref(leftmost).cast_mut(),
            buffer: Vec::with_capacity(Node::<V, ORDER>::MAX_FANOUT),
            pos: 0,
            _tree: PhantomData,
        }
    }

    /// All leaf keys in order, duplicates included.
    #[must_use]
    pub fn keys(&self) -> Vec<u64> {
        self.iter().map(|(key, _)| key).collect()
    }

    /// Write every leaf key (`show_keys`) or every value, space-separated
    /// and in key order, followed by a newline.
    ///
    /// Intended for a quiescent tree.
    ///
    /// # Errors
    /// Propagates errors from `out`.
    pub fn traverse<W: Write>(&self, show_keys: bool, out: &mut W) -> io::Result<()>
    where
        V: StdFmt::Debug,
    {
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                out.write_all(b" ")?;
            }

            if show_keys {
                write!(out, "{key}")?;
            } else {
                write!(out, "{value:?}")?;
            }
        }

        writeln!(out)
    }
}

impl<'a, V, const ORDER: usize> IntoIterator for &'a BLinkTree<V, ORDER> {
    type Item = (u64, &'a V);
    type IntoIter = Iter<'a, V, ORDER>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_iter_in_key_order() {
        let tree: BLinkTree<String, 2> = BLinkTree::new();
        for key in [50, 10, 40, 20, 30, 60, 0] {
            tree.insert(key, format!("v{key}"));
        }

        let pairs: Vec<(u64, &String)> = tree.iter().collect();
        let keys: Vec<u64> = pairs.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![0, 10, 20, 30, 40, 50, 60]);
        assert_eq!(pairs[3].1, "v30");
    }

    #[test]
    fn test_empty_iter() {
        let tree: BLinkTree<u64, 2> = BLinkTree::new();
        assert_eq!(tree.iter().next(), None);
        assert!(tree.keys().is_empty());
    }

    #[test]
    fn test_traverse_keys_and_values() {
        let tree: BLinkTree<u64, 3> = BLinkTree::new();
        for key in [3, 1, 2] {
            tree.insert(key, key * 10);
        }

        let mut out: Vec<u8> = Vec::new();
        tree.traverse(true, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 2 3\n");

        let mut out: Vec<u8> = Vec::new();
        tree.traverse(false, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "10 20 30\n");
    }

    #[test]
    fn test_into_iter_for_ref() {
        let tree: BLinkTree<u64, 3> = BLinkTree::new();
        for key in 0..20 {
            tree.insert(key, key);
        }

        let sum: u64 = (&tree).into_iter().map(|(_, v)| *v).sum();
        assert_eq!(sum, (0..20).sum());
    }

    /// A scan racing with inserts never repeats a key and never loses one
    /// that existed before it started.
    #[test]
    fn test_iter_concurrent_with_inserts() {
        let tree: BLinkTree<u64, 3> = BLinkTree::new();
        for key in (0..2_000).map(|k| k * 2) {
            tree.insert(key, key);
        }

        thread::scope(|s| {
            s.spawn(|| {
                for key in (0..2_000).map(|k| k * 2 + 1) {
                    tree.insert(key, key);
                }
            });

            for _ in 0..10 {
                let keys: Vec<u64> = tree.keys();
                assert!(keys.windows(2).all(|w| w[0] < w[1]));
                let evens = keys.iter().filter(|k| *k % 2 == 0).count();
                assert_eq!(evens, 2_000);
            }
        });

        assert_eq!(tree.keys(), (0..4_000).collect::<Vec<u64>>());
    }
}
