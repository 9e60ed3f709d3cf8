//! idle handle
//!
//! Fires once per loop iteration, whenever the loop has no other pending
//! I/O. Commonly used to yield (one single tick) before doing more work.

use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::reactor::Loop;

type IdleCallback = Box<dyn FnMut(&Idle)>;
type IdleHandle = Handle<libuv_sys2::uv_idle_t>;

#[derive(Clone)]
pub struct Idle(IdleHandle);

extern "C" fn idle_trampoline(raw: *mut libuv_sys2::uv_idle_t) {
    unsafe {
        let instance = Instance::from_raw(raw);
        let ptr = instance as *mut Instance<libuv_sys2::uv_idle_t>;
        handle::incref(ptr);
        let owner = Idle(Handle::from_ptr(ptr));
        if let Some(cb) = owner.0.supplemental_mut::<IdleCallback>() {
            cb(&owner);
        }
    }
}

impl Idle {
    pub fn new(loop_: &Loop) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_idle_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_idle_init(loop_.as_raw(), owner.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &IdleHandle {
        &self.0
    }

    pub fn start(&self, cb: impl FnMut(&Idle) + 'static) -> Result<()> {
        self.0.set_supplemental::<IdleCallback>(Box::new(cb));
        let status = unsafe { libuv_sys2::uv_idle_start(self.0.uv(), Some(idle_trampoline)) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_idle_stop(self.0.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }
}
