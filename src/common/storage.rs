//! storage
//!
//! A single non-generic handle type has to hold callbacks of whatever
//! concrete closure type the caller passed in. The idiomatic Rust answer to
//! "store a value of unknown type behind a replaceable slot" is a boxed
//! trait object behind an `Option`; no raw byte storage or manual
//! destructor pointer is needed. `LoopCell<T>` below is that slot: an
//! `UnsafeCell` because callback slots are only ever touched from the loop
//! thread. Slots written from other threads (e.g. a threadpool work result)
//! instead use `parking_lot::Mutex<Option<T>>` directly at the call site.
use std::cell::UnsafeCell;
use std::fmt;

/// A single replaceable value, accessed only from the loop thread.
///
/// Replacing a populated slot drops the prior value first: at most one
/// value lives in the slot at a time.
pub struct LoopCell<T>(UnsafeCell<Option<T>>);

impl<T> LoopCell<T> {
    pub fn new() -> Self {
        Self(UnsafeCell::new(None))
    }

    pub fn empty() -> Self {
        Self::new()
    }

    /// # Safety
    /// The caller must guarantee no other loop-thread access to this slot is
    /// in progress (callback trampolines must not reenter).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut Option<T> {
        &mut *self.0.get()
    }

    pub fn set(&self, value: T) {
        unsafe { *self.get_mut() = Some(value) };
    }

    pub fn clear(&self) {
        unsafe { *self.get_mut() = None };
    }

    pub fn is_set(&self) -> bool {
        unsafe { self.get_mut().is_some() }
    }

    pub fn take(&self) -> Option<T> {
        unsafe { self.get_mut().take() }
    }
}

impl<T> Default for LoopCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LoopCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopCell")
            .field("is_set", &self.is_set())
            .finish()
    }
}

// Handles and requests are only ever manipulated from the loop thread; the
// underlying storage is therefore `Send`-but-not-`Sync` in spirit, but we
// mark it `Sync` because the instance blocks themselves are shared via a
// raw pointer recovered inside engine trampolines which may run on whichever
// OS thread the engine chooses to invoke them from (still never concurrently
// with loop-thread code, by libuv's own single-threaded-callback guarantee).
unsafe impl<T: Send> Sync for LoopCell<T> {}
