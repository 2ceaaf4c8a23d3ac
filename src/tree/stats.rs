//! Protocol counters for the B-link tree.
//!
//! Every counter is a relaxed `AtomicU64`: the counters are diagnostics,
//! never used to make a protocol decision, so they need atomicity only.

use std::fmt as StdFmt;
use std::sync::atomic::AtomicU64;

use crate::ordering::RELAXED;

/// Live counters owned by a tree.
#[derive(Debug, Default)]
pub struct TreeStats {
    read_restarts: AtomicU64,
    write_restarts: AtomicU64,
    moves_right: AtomicU64,
    latch_failures: AtomicU64,
    leaf_splits: AtomicU64,
    internal_splits: AtomicU64,
    root_growths: AtomicU64,
    ancestor_bounces: AtomicU64,
    root_retries: AtomicU64,
}

/// Point-in-time copy of [`TreeStats`].
///
/// Counters are read one by one, so a snapshot taken while writers run is
/// not a single consistent cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Searches that restarted a node after failed validation.
    pub read_restarts: u64,

    /// Inserts that restarted a node after failed validation.
    pub write_restarts: u64,

    /// Times an operation followed a right-sibling link.
    pub moves_right: u64,

    /// `try_lock_at` calls that lost a race.
    pub latch_failures: u64,

    /// Leaf half-splits installed.
    pub leaf_splits: u64,

    /// Internal half-splits installed (not counting root growth).
    pub internal_splits: u64,

    /// New roots published.
    pub root_growths: u64,

    /// Inserts that landed on a full node and went back to its parent.
    pub ancestor_bounces: u64,

    /// Tree-level insert loop iterations beyond the first.
    pub root_retries: u64,
}

macro_rules! recorders {
    ($($fn_name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub(crate) fn $fn_name(&self) {
                self.$field.fetch_add(1, RELAXED);
            }
        )*
    };
}

impl TreeStats {
    /// All counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    recorders! {
        record_read_restart => read_restarts,
        record_write_restart => write_restarts,
        record_move_right => moves_right,
        record_latch_failure => latch_failures,
        record_leaf_split => leaf_splits,
        record_internal_split => internal_splits,
        record_root_growth => root_growths,
        record_ancestor_bounce => ancestor_bounces,
        record_root_retry => root_retries,
    }

    /// Copy the counters out.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            read_restarts: self.read_restarts.load(RELAXED),
            write_restarts: self.write_restarts.load(RELAXED),
            moves_right: self.moves_right.load(RELAXED),
            latch_failures: self.latch_failures.load(RELAXED),
            leaf_splits: self.leaf_splits.load(RELAXED),
            internal_splits: self.internal_splits.load(RELAXED),
            root_growths: self.root_growths.load(RELAXED),
            ancestor_bounces: self.ancestor_bounces.load(RELAXED),
            root_retries: self.root_retries.load(RELAXED),
        }
    }
}

impl StatsSnapshot {
    /// Total splits of any kind, root growth included.
    #[must_use]
    pub const fn total_splits(&self) -> u64 {
        self.leaf_splits + self.internal_splits + self.root_growths
    }

    /// Total restarts caused by contention or staleness.
    #[must_use]
    pub const fn total_restarts(&self) -> u64 {
        self.read_restarts + self.write_restarts + self.latch_failures
    }
}

impl StdFmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "splits: {} leaf / {} internal / {} root, \
             restarts: {} read / {} write / {} latch, \
             moves right: {}, bounces: {}, root retries: {}",
            self.leaf_splits,
            self.internal_splits,
            self.root_growths,
            self.read_restarts,
            self.write_restarts,
            self.latch_failures,
            self.moves_right,
            self.ancestor_bounces,
            self.root_retries,
        )
    }
}
