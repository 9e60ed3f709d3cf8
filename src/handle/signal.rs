//! signal handle

use std::os::raw::c_int;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::reactor::Loop;

type SignalCallback = Box<dyn FnMut(&Signal, c_int)>;
type SignalHandleInner = Handle<libuv_sys2::uv_signal_t>;

#[derive(Clone)]
pub struct Signal(SignalHandleInner);

extern "C" fn signal_trampoline(raw: *mut libuv_sys2::uv_signal_t, signum: c_int) {
    unsafe {
        debug!(signum, "signal received");
        let instance = Instance::from_raw(raw);
        let ptr = instance as *mut Instance<libuv_sys2::uv_signal_t>;
        handle::incref(ptr);
        let owner = Signal(Handle::from_ptr(ptr));
        if let Some(cb) = owner.0.supplemental_mut::<SignalCallback>() {
            cb(&owner, signum);
        }
    }
}

impl Signal {
    pub fn new(loop_: &Loop) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_signal_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_signal_init(loop_.as_raw(), owner.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &SignalHandleInner {
        &self.0
    }

    pub fn start(&self, signum: c_int, cb: impl FnMut(&Signal, c_int) + 'static) -> Result<()> {
        debug!(signum, "signal start");
        self.0.set_supplemental::<SignalCallback>(Box::new(cb));
        let status =
            unsafe { libuv_sys2::uv_signal_start(self.0.uv(), Some(signal_trampoline), signum) };
        if status < 0 {
            warn!(status, "signal start failed");
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    /// Like [`Self::start`], but the handle is unreferenced so that it
    /// alone does not keep the loop alive.
    pub fn start_oneshot(&self, signum: c_int, cb: impl FnMut(&Signal, c_int) + 'static) -> Result<()> {
        debug!(signum, "signal start_oneshot");
        self.0.set_supplemental::<SignalCallback>(Box::new(cb));
        let status = unsafe {
            libuv_sys2::uv_signal_start_oneshot(self.0.uv(), Some(signal_trampoline), signum)
        };
        if status < 0 {
            warn!(status, "signal start_oneshot failed");
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        debug!("signal stop");
        let status = unsafe { libuv_sys2::uv_signal_stop(self.0.uv()) };
        if status < 0 {
            warn!(status, "signal stop failed");
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn signum(&self) -> c_int {
        unsafe { (*self.0.uv()).signum }
    }
}
