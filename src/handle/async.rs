//! async handle
//!
//! The only handle safe to operate from threads other than the loop
//! thread: `send()` wakes the loop and runs the registered callback once,
//! coalescing any sends that arrive before the loop gets to them.

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::reactor::Loop;

type AsyncCallback = Box<dyn FnMut(&Async) + Send>;
type AsyncHandleInner = Handle<libuv_sys2::uv_async_t>;

#[derive(Clone)]
pub struct Async(AsyncHandleInner);

unsafe impl Send for Async {}
unsafe impl Sync for Async {}

extern "C" fn async_trampoline(raw: *mut libuv_sys2::uv_async_t) {
    unsafe {
        trace!("async_trampoline woken");
        let instance = Instance::from_raw(raw);
        let ptr = instance as *mut Instance<libuv_sys2::uv_async_t>;
        handle::incref(ptr);
        let owner = Async(Handle::from_ptr(ptr));
        if let Some(cb) = owner.0.supplemental_mut::<AsyncCallback>() {
            cb(&owner);
        }
    }
}

impl Async {
    pub fn new(loop_: &Loop, cb: impl FnMut(&Async) + Send + 'static) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_async_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        owner.set_supplemental::<AsyncCallback>(Box::new(cb));
        let status =
            unsafe { libuv_sys2::uv_async_init(loop_.as_raw(), owner.uv(), Some(async_trampoline)) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &AsyncHandleInner {
        &self.0
    }

    /// Wake the loop and arrange for the callback to run. May be called
    /// from any thread, any number of times; concurrent sends before the
    /// loop processes them coalesce into a single callback invocation.
    pub fn send(&self) -> Result<()> {
        trace!("async send");
        let status = unsafe { libuv_sys2::uv_async_send(self.0.uv()) };
        if status < 0 {
            warn!(status, "async send failed");
            return Err(Error::from_status(status));
        }
        Ok(())
    }
}
