//! check handle
//!
//! Fires once per loop iteration, right after the loop returns from
//! polling for I/O.

use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::reactor::Loop;

type CheckCallback = Box<dyn FnMut(&Check)>;
type CheckHandle = Handle<libuv_sys2::uv_check_t>;

#[derive(Clone)]
pub struct Check(CheckHandle);

extern "C" fn check_trampoline(raw: *mut libuv_sys2::uv_check_t) {
    unsafe {
        let instance = Instance::from_raw(raw);
        let ptr = instance as *mut Instance<libuv_sys2::uv_check_t>;
        handle::incref(ptr);
        let owner = Check(Handle::from_ptr(ptr));
        if let Some(cb) = owner.0.supplemental_mut::<CheckCallback>() {
            cb(&owner);
        }
    }
}

impl Check {
    pub fn new(loop_: &Loop) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_check_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_check_init(loop_.as_raw(), owner.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &CheckHandle {
        &self.0
    }

    pub fn start(&self, cb: impl FnMut(&Check) + 'static) -> Result<()> {
        self.0.set_supplemental::<CheckCallback>(Box::new(cb));
        let status = unsafe { libuv_sys2::uv_check_start(self.0.uv(), Some(check_trampoline)) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_check_stop(self.0.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }
}
