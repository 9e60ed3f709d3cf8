//! prepare handle
//!
//! Fires once per loop iteration, right before the loop blocks for I/O.

use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::reactor::Loop;

type PrepareCallback = Box<dyn FnMut(&Prepare)>;
type PrepareHandle = Handle<libuv_sys2::uv_prepare_t>;

#[derive(Clone)]
pub struct Prepare(PrepareHandle);

extern "C" fn prepare_trampoline(raw: *mut libuv_sys2::uv_prepare_t) {
    unsafe {
        let instance = Instance::from_raw(raw);
        let ptr = instance as *mut Instance<libuv_sys2::uv_prepare_t>;
        handle::incref(ptr);
        let owner = Prepare(Handle::from_ptr(ptr));
        if let Some(cb) = owner.0.supplemental_mut::<PrepareCallback>() {
            cb(&owner);
        }
    }
}

impl Prepare {
    pub fn new(loop_: &Loop) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_prepare_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_prepare_init(loop_.as_raw(), owner.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &PrepareHandle {
        &self.0
    }

    pub fn start(&self, cb: impl FnMut(&Prepare) + 'static) -> Result<()> {
        self.0.set_supplemental::<PrepareCallback>(Box::new(cb));
        let status = unsafe { libuv_sys2::uv_prepare_start(self.0.uv(), Some(prepare_trampoline)) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_prepare_stop(self.0.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }
}
