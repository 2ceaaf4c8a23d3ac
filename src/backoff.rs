//! Bounded exponential backoff for latch and validation retry loops.
//!
//! Phase 1 spins with `spin_loop` hints, doubling the spin count each step.
//! Once the spin budget is exhausted every further step yields the thread.
//! Backoff never changes what a retry loop observes, only how often it polls.

/// Spin budget is `2^SPIN_LIMIT` iterations in the last spinning step.
const SPIN_LIMIT: u32 = 6;

/// Per-loop backoff state.
///
/// ```rust
/// use blinktree::backoff::Backoff;
///
/// let mut backoff = Backoff::new();
/// for _ in 0..3 {
///     backoff.snooze();
/// }
/// assert_eq!(backoff.step(), 3);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    /// Fresh backoff state.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    /// Number of times `snooze` has been called.
    #[inline]
    #[must_use]
    pub const fn step(&self) -> u32 {
        self.step
    }

    /// Wait a little before the caller retries.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                std::hint::spin_loop();
            }
        } else {
            std::thread::yield_now();
        }

        self.step = self.step.saturating_add(1);
    }

    /// Forget accumulated backoff after forward progress.
    #[inline]
    pub const fn reset(&mut self) {
        self.step = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_escalates_to_yield() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.step(), 0);

        for _ in 0..=SPIN_LIMIT {
            backoff.snooze();
        }

        // Past the spin budget: further steps yield.
        assert!(backoff.step() > SPIN_LIMIT);
        backoff.snooze();
        assert_eq!(backoff.step(), SPIN_LIMIT + 2);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new();
        backoff.snooze();
        backoff.snooze();
        backoff.reset();
        assert_eq!(backoff.step(), 0);
    }
}
