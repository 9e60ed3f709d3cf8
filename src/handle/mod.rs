//! handle
//!
//! The base every handle variant is built on. A single non-generic engine
//! struct (`uv_handle_t`, `uv_tcp_t`, `uv_timer_t`, ...) always carries a
//! user `data` field; rather than reproduce the C++ original's
//! `offsetof`-based instance recovery (which assumes a standard-layout
//! struct Rust does not guarantee), each `Instance<R>` stashes its own raw
//! pointer in that field at construction time and recovers it from there.

pub mod check;
pub mod idle;
pub mod prepare;
pub mod process;
pub mod signal;
pub mod timer;
pub mod r#async;
pub mod stream;
pub mod tcp;
pub mod pipe;
pub mod tty;
pub mod udp;
pub mod file;

use std::any::Any;
use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr::NonNull;

use tracing::trace;

use crate::common::{LoopCell, RefCount};
use crate::error::{Error, Result};
use crate::reactor::Loop;

pub(crate) type OnDestroyFn = Box<dyn FnMut(*mut c_void)>;

/// The engine-struct portion every handle variant shares, plus the pieces
/// this crate adds: a reference count, a loop keep-alive, an on-destroy
/// slot, and `supplemental` -- a type-erased slot each variant module uses
/// to hold whatever closure(s) its own engine callbacks need, recovered by
/// downcasting instead of a fixed in-place byte buffer.
#[repr(C)]
pub(crate) struct Instance<R> {
    rc: RefCount,
    on_destroy: LoopCell<OnDestroyFn>,
    pub(crate) supplemental: LoopCell<Box<dyn Any>>,
    loop_: Loop,
    pub(crate) uv: R,
}

impl<R> Instance<R> {
    /// # Safety
    /// `R`'s first field must be (or alias) a `uv_handle_t`, which every
    /// concrete libuv handle struct guarantees.
    pub(crate) unsafe fn from_raw<'a>(raw: *mut R) -> &'a mut Instance<R> {
        let base = raw as *mut libuv_sys2::uv_handle_t;
        &mut *((*base).data as *mut Instance<R>)
    }

    fn as_handle_ptr(&self) -> *mut libuv_sys2::uv_handle_t {
        &self.uv as *const R as *mut R as *mut libuv_sys2::uv_handle_t
    }
}

/// Allocate a new zeroed `Instance<R>`, wire its back-pointer into the
/// embedded engine struct's `data` field, and return a raw pointer to it.
/// The caller must follow up with the variant's own `uv_*_init` call before
/// handing the handle to any other engine function.
pub(crate) fn create<R: Default>(loop_: &Loop) -> *mut Instance<R> {
    let boxed = Box::new(Instance {
        rc: RefCount::new(),
        on_destroy: LoopCell::new(),
        supplemental: LoopCell::new(),
        loop_: loop_.clone(),
        uv: R::default(),
    });
    let raw = Box::into_raw(boxed);
    unsafe {
        let base = (*raw).as_handle_ptr();
        (*base).data = raw as *mut c_void;
    }
    raw
}

extern "C" fn close_cb<R>(raw: *mut libuv_sys2::uv_handle_t) {
    unsafe {
        trace!("close_cb");
        let ptr = (*raw).data as *mut Instance<R>;
        let mut boxed = Box::from_raw(ptr);
        if let Some(cb) = boxed.on_destroy.take() {
            cb(raw as *mut c_void);
        }
    }
}

fn destroy<R>(ptr: *mut Instance<R>) {
    unsafe {
        let base = (*ptr).as_handle_ptr();
        if libuv_sys2::uv_is_closing(base) != 0 {
            return;
        }
        trace!("handle refcount reached zero, closing");
        libuv_sys2::uv_close(base, Some(close_cb::<R>));
    }
}

pub(crate) fn incref<R>(ptr: *mut Instance<R>) {
    unsafe { (*ptr).rc.inc() };
}

pub(crate) fn decref<R>(ptr: *mut Instance<R>) {
    unsafe {
        if (*ptr).rc.dec() == 0 {
            destroy(ptr);
        }
    }
}

/// A reference-counted handle onto a single libuv handle variant.
///
/// `R` is the engine struct (`uv_timer_t`, `uv_tcp_t`, ...); variant
/// modules build their public API on top of `Handle<R>`.
pub struct Handle<R>(pub(crate) NonNull<Instance<R>>);

unsafe impl<R: Send> Send for Handle<R> {}

impl<R> Handle<R> {
    pub(crate) fn from_ptr(ptr: *mut Instance<R>) -> Self {
        Self(NonNull::new(ptr).expect("handle instance pointer must not be null"))
    }

    pub(crate) fn instance(&self) -> &Instance<R> {
        unsafe { self.0.as_ref() }
    }

    pub(crate) fn uv(&self) -> *mut R {
        unsafe { &mut (*self.0.as_ptr()).uv as *mut R }
    }

    fn as_handle_ptr(&self) -> *mut libuv_sys2::uv_handle_t {
        self.instance().as_handle_ptr()
    }

    pub fn nrefs(&self) -> i64 {
        self.instance().rc.value()
    }

    pub fn r#loop(&self) -> Loop {
        self.instance().loop_.clone()
    }

    pub fn data(&self) -> *mut c_void {
        unsafe { (*self.as_handle_ptr()).data }
    }

    pub fn is_active(&self) -> bool {
        unsafe { libuv_sys2::uv_is_active(self.as_handle_ptr()) != 0 }
    }

    pub fn is_closing(&self) -> bool {
        unsafe { libuv_sys2::uv_is_closing(self.as_handle_ptr()) != 0 }
    }

    pub fn on_destroy(&self, cb: impl FnMut(*mut c_void) + 'static) {
        self.instance().on_destroy.set(Box::new(cb));
    }

    /// Store this variant's callback(s) in the type-erased supplemental
    /// slot, replacing whatever was there before.
    pub(crate) fn set_supplemental<T: 'static>(&self, value: T) {
        self.instance().supplemental.set(Box::new(value));
    }

    /// # Safety
    /// The caller must only call this from the loop thread (or from inside
    /// an engine trampoline synchronously invoked by it), and must know
    /// that `T` matches whatever `set_supplemental` last stored.
    pub(crate) unsafe fn supplemental_mut<T: 'static>(&self) -> Option<&mut T> {
        self.instance()
            .supplemental
            .get_mut()
            .as_mut()
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    pub fn fileno(&self) -> Result<c_int> {
        let mut fd: libuv_sys2::uv_os_fd_t = std::ptr::null_mut();
        let status = unsafe { libuv_sys2::uv_fileno(self.as_handle_ptr(), &mut fd) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(fd as c_int)
    }

    pub fn send_buffer_size(&self) -> Result<u32> {
        let mut value: c_int = 0;
        let status = unsafe { libuv_sys2::uv_send_buffer_size(self.as_handle_ptr(), &mut value) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(value as u32)
    }

    pub fn set_send_buffer_size(&self, size: u32) -> Result<()> {
        let mut value = size as c_int;
        let status = unsafe { libuv_sys2::uv_send_buffer_size(self.as_handle_ptr(), &mut value) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn recv_buffer_size(&self) -> Result<u32> {
        let mut value: c_int = 0;
        let status = unsafe { libuv_sys2::uv_recv_buffer_size(self.as_handle_ptr(), &mut value) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(value as u32)
    }

    pub fn set_recv_buffer_size(&self, size: u32) -> Result<()> {
        let mut value = size as c_int;
        let status = unsafe { libuv_sys2::uv_recv_buffer_size(self.as_handle_ptr(), &mut value) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }
}

impl<R> Clone for Handle<R> {
    fn clone(&self) -> Self {
        incref(self.0.as_ptr());
        Self(self.0)
    }
}

impl<R> Drop for Handle<R> {
    fn drop(&mut self) {
        decref(self.0.as_ptr());
    }
}

impl<R> PartialEq for Handle<R> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
