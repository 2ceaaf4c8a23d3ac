//! Test hooks for deterministic concurrency testing.
//!
//! Root growth hooks live on the tree instance rather than in statics, so
//! tests that run in parallel in one binary never trip each other's
//! barriers. The descent hook is thread-local: it fires only on the thread
//! that installed it.
//!
//! # Usage
//!
//! ```rust,ignore
//! let barrier = Arc::new(Barrier::new(4));
//! tree.hooks.set_before_root_latch(Arc::new(move || {
//!     barrier.wait(); // every grower holds the same full-root snapshot
//! }));
//! ```

#![expect(clippy::unwrap_used, reason = "Fail fast in tests")]

use std::cell::RefCell;
use std::sync::{Arc, Mutex};

/// Hook type: a shared closure that takes no arguments.
///
/// Shared so a caller can clone it out and run it without holding the lock;
/// hooks are free to block on other threads.
pub type TestHook = Arc<dyn Fn() + Send + Sync>;

/// One-shot hook for the current thread.
pub type DescendHook = Box<dyn FnOnce()>;

thread_local! {
    static AFTER_DESCEND: RefCell<Option<DescendHook>> = const { RefCell::new(None) };
}

/// Install a one-shot hook that runs the next time this thread's insert
/// steps from an internal node into a child.
///
/// The insert holds no latch while the hook runs, so the hook may itself
/// insert into the same tree.
pub fn set_after_descend(hook: DescendHook) {
    AFTER_DESCEND.with(|slot| *slot.borrow_mut() = Some(hook));
}

/// Run and clear this thread's descent hook, if any.
pub(crate) fn after_descend() {
    let hook: Option<DescendHook> = AFTER_DESCEND.with(|slot| slot.borrow_mut().take());
    if let Some(hook) = hook {
        hook();
    }
}

/// Per-tree hook points.
#[derive(Default)]
pub struct TreeHooks {
    /// Called in root growth after the speculative split is built and
    /// before the old root is latched.
    before_root_latch: Mutex<Option<TestHook>>,
}

impl TreeHooks {
    /// Install the before-root-latch hook.
    ///
    /// # Panics
    /// Panics if the hook was already set and not cleared.
    pub fn set_before_root_latch(&self, hook: TestHook) {
        let mut guard = self.before_root_latch.lock().unwrap();
        assert!(
            guard.is_none(),
            "before_root_latch already set; call clear_before_root_latch first"
        );
        *guard = Some(hook);
    }

    /// Remove the before-root-latch hook.
    pub fn clear_before_root_latch(&self) {
        *self.before_root_latch.lock().unwrap() = None;
    }

    /// Run the before-root-latch hook, if any.
    ///
    /// The hook is called after the mutex is released.
    pub(crate) fn before_root_latch(&self) {
        let hook: Option<TestHook> = self.before_root_latch.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn test_hook_set_run_clear() {
        let hooks = TreeHooks::default();
        let calls = Arc::new(AtomicUsize::new(0));

        hooks.before_root_latch();

        let counter = Arc::clone(&calls);
        hooks.set_before_root_latch(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        hooks.before_root_latch();
        hooks.before_root_latch();
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        hooks.clear_before_root_latch();
        hooks.before_root_latch();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    /// A hook that waits for other threads must not keep them out of the
    /// hook point.
    #[test]
    fn test_blocking_hook_runs_on_all_threads_at_once() {
        const THREADS: usize = 3;

        let hooks = TreeHooks::default();
        let barrier = Arc::new(Barrier::new(THREADS));
        {
            let barrier = Arc::clone(&barrier);
            hooks.set_before_root_latch(Arc::new(move || {
                barrier.wait();
            }));
        }

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| hooks.before_root_latch());
            }
        });
    }

    #[test]
    fn test_descend_hook_fires_once_on_own_thread() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        set_after_descend(Box::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        thread::spawn(after_descend).join().unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        after_descend();
        after_descend();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
