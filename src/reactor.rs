//! reactor
//!
//! The event loop: a thin, reference-counted handle onto an engine
//! `uv_loop_t`. Unlike handles and requests -- which the engine itself owns
//! while they're active, forcing a back-pointer recovery trick -- nothing
//! but our own code ever holds a pointer to the loop struct, so an `Arc`
//! gives us the refcounting for free instead of hand-rolling one.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::common::LoopCell;
use crate::error::{Error, Result};

/// A non-owning alias onto a handle encountered during [`Loop::walk`] --
/// unlike [`crate::handle::Handle`], it takes no reference on the instance
/// and only exposes what the engine's own `uv_handle_t` surface reports
/// (no up-cast to a typed `Tcp`/`Timer`/... wrapper, since the walk gives no
/// static type information).
pub struct WalkHandle<'a> {
    raw: *mut libuv_sys2::uv_handle_t,
    _marker: PhantomData<&'a ()>,
}

impl<'a> WalkHandle<'a> {
    pub fn handle_type(&self) -> libuv_sys2::uv_handle_type {
        unsafe { libuv_sys2::uv_handle_get_type(self.raw) }
    }

    pub fn is_active(&self) -> bool {
        unsafe { libuv_sys2::uv_is_active(self.raw) != 0 }
    }

    pub fn is_closing(&self) -> bool {
        unsafe { libuv_sys2::uv_is_closing(self.raw) != 0 }
    }

    pub fn has_ref(&self) -> bool {
        unsafe { libuv_sys2::uv_has_ref(self.raw) != 0 }
    }
}

extern "C" fn walk_cb(raw: *mut libuv_sys2::uv_handle_t, arg: *mut c_void) {
    unsafe {
        let cb = &mut *(arg as *mut &mut dyn FnMut(WalkHandle));
        cb(WalkHandle { raw, _marker: PhantomData });
    }
}

type OnDestroyFn = Box<dyn FnMut(*mut c_void) + Send>;
type OnExitFn = Box<dyn FnMut(&Loop) + Send>;

struct Instance {
    uv_loop: UnsafeCell<libuv_sys2::uv_loop_t>,
    keep_alive: UnsafeCell<Option<Box<libuv_sys2::uv_async_t>>>,
    on_destroy: LoopCell<OnDestroyFn>,
    on_exit: LoopCell<OnExitFn>,
}

// All access to the cells above happens either from the loop thread or
// while the loop thread is synchronously blocked inside an engine call; see
// the module-level note.
unsafe impl Send for Instance {}
unsafe impl Sync for Instance {}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(handle) = (*self.keep_alive.get()).take() {
                let raw = Box::into_raw(handle);
                libuv_sys2::uv_unref(raw as *mut libuv_sys2::uv_handle_t);
                libuv_sys2::uv_close(raw as *mut libuv_sys2::uv_handle_t, None);
                drop(Box::from_raw(raw));
            }
            libuv_sys2::uv_loop_close(self.uv_loop.get());
        }
    }
}

/// A reference to an event loop.
///
/// Cloning a `Loop` bumps the underlying reference count; the engine loop
/// struct is only closed and freed once every clone (and every handle or
/// request still bound to it) has gone.
#[derive(Clone)]
pub struct Loop(Arc<Instance>);

impl Loop {
    /// Create a new, independent event loop.
    pub fn new() -> Result<Self> {
        let mut uv_loop: libuv_sys2::uv_loop_t = unsafe { std::mem::zeroed() };
        let status = unsafe { libuv_sys2::uv_loop_init(&mut uv_loop) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        let instance = Arc::new(Instance {
            uv_loop: UnsafeCell::new(uv_loop),
            keep_alive: UnsafeCell::new(None),
            on_destroy: LoopCell::new(),
            on_exit: LoopCell::new(),
        });
        unsafe {
            (*instance.uv_loop.get()).data = Arc::as_ptr(&instance) as *mut c_void;
        }
        Ok(Self(instance))
    }

    /// The process-wide default loop, lazily created on first use and
    /// shared by every caller thereafter.
    pub fn default() -> Self {
        static DEFAULT: OnceLock<Loop> = OnceLock::new();
        DEFAULT
            .get_or_init(|| Loop::new().expect("default loop failed to initialize"))
            .clone()
    }

    fn raw(&self) -> *mut libuv_sys2::uv_loop_t {
        self.0.uv_loop.get()
    }

    /// The number of live `Loop` handles referring to this event loop.
    pub fn nrefs(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn on_destroy(&self, cb: impl FnMut(*mut c_void) + Send + 'static) {
        self.0.on_destroy.set(Box::new(cb));
    }

    pub fn on_exit(&self, cb: impl FnMut(&Loop) + Send + 'static) {
        self.0.on_exit.set(Box::new(cb));
    }

    /// The user-defined data pointer stored on the underlying `uv_loop_t`.
    ///
    /// Slot zero is reserved for the back-pointer the reactor installs at
    /// construction time; callers needing their own per-loop data should
    /// keep it alongside a `Loop` clone instead of overwriting this field.
    pub fn data(&self) -> *mut c_void {
        unsafe { (*self.raw()).data }
    }

    /// Apply additional loop options (`uv_loop_configure`).
    pub fn configure(&self, option: c_int) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_loop_configure(self.raw(), option) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    /// Run the loop, processing events and their callbacks on the current
    /// thread, according to `mode`.
    pub fn run(&self, mode: libuv_sys2::uv_run_mode) -> Result<c_int> {
        let status = unsafe { libuv_sys2::uv_run(self.raw(), mode) };
        debug!(status, "loop run returned");
        if let Some(exit_cb) = unsafe { self.0.on_exit.get_mut() } {
            exit_cb(self);
        }
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(status)
    }

    /// Stop the event loop. Active handles and requests are not closed, but
    /// `run` returns as soon as possible.
    pub fn stop(&self) {
        unsafe { libuv_sys2::uv_stop(self.raw()) };
    }

    /// `true` if there are active handles or pending requests in the loop.
    pub fn is_alive(&self) -> bool {
        unsafe { libuv_sys2::uv_loop_alive(self.raw()) != 0 }
    }

    /// Toggle an internal reference that keeps the loop alive independent
    /// of its handles: `true` holds it alive through the next `run` call,
    /// `false` releases the hold.
    pub fn keep_alive(&self, enable: bool) -> Result<()> {
        unsafe {
            let slot = &mut *self.0.keep_alive.get();
            if enable {
                match slot {
                    Some(handle) => {
                        libuv_sys2::uv_ref(handle.as_mut() as *mut _ as *mut libuv_sys2::uv_handle_t)
                    }
                    None => {
                        let mut handle: Box<libuv_sys2::uv_async_t> = Box::new(std::mem::zeroed());
                        let status = libuv_sys2::uv_async_init(self.raw(), handle.as_mut(), None);
                        if status < 0 {
                            return Err(Error::from_status(status));
                        }
                        *slot = Some(handle);
                    }
                }
            } else if let Some(handle) = slot {
                libuv_sys2::uv_unref(handle.as_mut() as *mut _ as *mut libuv_sys2::uv_handle_t);
            }
        }
        Ok(())
    }

    /// Apply `cb` to every handle currently registered on the loop, passing
    /// each a temporary, non-owning [`WalkHandle`] alias. `cb` is stored on
    /// the stack for the duration of the synchronous `uv_walk` call and
    /// never escapes it.
    pub fn walk(&self, mut cb: impl FnMut(WalkHandle)) {
        debug!("walk");
        let mut cb_ref: &mut dyn FnMut(WalkHandle) = &mut cb;
        let arg = &mut cb_ref as *mut &mut dyn FnMut(WalkHandle) as *mut c_void;
        unsafe { libuv_sys2::uv_walk(self.raw(), Some(walk_cb), arg) };
    }

    /// The backend's poll file descriptor, where supported by the platform.
    pub fn backend_fd(&self) -> c_int {
        unsafe { libuv_sys2::uv_backend_fd(self.raw()) }
    }

    /// Poll timeout in milliseconds, or `-1` for no timeout.
    pub fn backend_timeout(&self) -> c_int {
        unsafe { libuv_sys2::uv_backend_timeout(self.raw()) }
    }

    /// The loop's cached notion of "now", in milliseconds.
    pub fn now(&self) -> u64 {
        unsafe { libuv_sys2::uv_now(self.raw()) }
    }

    /// Refresh the loop's cached notion of "now".
    pub fn update_time(&self) {
        unsafe { libuv_sys2::uv_update_time(self.raw()) };
    }

    pub(crate) fn as_raw(&self) -> *mut libuv_sys2::uv_loop_t {
        self.raw()
    }
}

impl PartialEq for Loop {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_loop_is_alive_but_idle() {
        let l = Loop::new().unwrap();
        assert!(!l.is_alive());
        assert_eq!(l.nrefs(), 1);
    }

    #[test]
    fn clone_increments_refs() {
        let l = Loop::new().unwrap();
        let l2 = l.clone();
        assert_eq!(l.nrefs(), 2);
        assert!(l == l2);
        drop(l2);
        assert_eq!(l.nrefs(), 1);
    }

    #[test]
    fn default_loop_is_shared() {
        let a = Loop::default();
        let b = Loop::default();
        assert!(a == b);
    }

    #[test]
    fn run_once_on_an_idle_loop_returns_immediately() {
        let l = Loop::new().unwrap();
        let status = l.run(libuv_sys2::uv_run_mode_UV_RUN_NOWAIT).unwrap();
        assert_eq!(status, 0);
    }

    #[test]
    fn walk_visits_every_registered_handle() {
        use crate::handle::timer::Timer;

        let l = Loop::new().unwrap();
        let _timer = Timer::new(&l).unwrap();

        let mut seen = 0;
        l.walk(|h| {
            assert_eq!(h.handle_type(), libuv_sys2::uv_handle_type_UV_TIMER);
            seen += 1;
        });
        assert_eq!(seen, 1);
    }
}
