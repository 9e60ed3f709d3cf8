//! refcount

use std::sync::atomic::{AtomicI64, Ordering};

/// An atomic reference count guarding the lifetime of a [`crate::handle`] or
/// [`crate::request`] instance block.
///
/// Mirrors the acquire/release discipline a C++ `ref_count` would use: `inc()`
/// uses relaxed ordering because the caller already holds a live reference
/// (there is nothing to synchronize-with), while `dec()` uses release so that
/// any writes made before the drop happen-before whichever thread observes
/// the count reach zero and proceeds to destroy the instance.
#[derive(Debug)]
pub struct RefCount(AtomicI64);

impl RefCount {
    /// A freshly constructed instance starts with exactly one owner.
    pub fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    /// The current count (acquire load).
    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    /// Add one reference.
    ///
    /// # Panics
    ///
    /// Panics if the count has already reached zero: incrementing from zero
    /// means the caller is resurrecting a reference from an alias that has
    /// already been (or is concurrently being) destroyed. That is a
    /// programmer error, not a recoverable condition.
    pub fn inc(&self) -> i64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                panic!("uvcc_rs: attempt to resurrect a reference from a count of zero");
            }
            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current + 1,
                Err(observed) => current = observed,
            }
        }
    }

    /// Release one reference, returning the count after the decrement. The
    /// caller must treat a return value of zero as its cue to destroy the
    /// enclosing instance exactly once.
    pub fn dec(&self) -> i64 {
        self.0.fetch_sub(1, Ordering::Release) - 1
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one() {
        assert_eq!(RefCount::new().value(), 1);
    }

    #[test]
    fn inc_dec_round_trips() {
        let rc = RefCount::new();
        rc.inc();
        rc.inc();
        assert_eq!(rc.value(), 3);
        assert_eq!(rc.dec(), 2);
        assert_eq!(rc.dec(), 1);
        assert_eq!(rc.dec(), 0);
    }

    #[test]
    #[should_panic(expected = "resurrect")]
    fn inc_from_zero_panics() {
        let rc = RefCount::new();
        assert_eq!(rc.dec(), 0);
        rc.inc();
    }
}
