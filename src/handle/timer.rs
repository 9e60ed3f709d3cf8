//! timer handle

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::reactor::Loop;

type TimerCallback = Box<dyn FnMut(&Timer)>;
type TimerHandle = Handle<libuv_sys2::uv_timer_t>;

/// A one-shot or repeating timer.
#[derive(Clone)]
pub struct Timer(TimerHandle);

extern "C" fn timeout_trampoline(raw: *mut libuv_sys2::uv_timer_t) {
    unsafe {
        trace!("timer fired");
        let instance = Instance::from_raw(raw);
        let ptr = instance as *mut Instance<libuv_sys2::uv_timer_t>;
        handle::incref(ptr);
        let owner = Timer(Handle::from_ptr(ptr));
        if let Some(cb) = owner.0.supplemental_mut::<TimerCallback>() {
            cb(&owner);
        }
    }
}

impl Timer {
    pub fn new(loop_: &Loop) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_timer_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_timer_init(loop_.as_raw(), owner.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &TimerHandle {
        &self.0
    }

    /// Start the timer: `cb` fires after `timeout` milliseconds, then every
    /// `repeat` milliseconds thereafter (`repeat == 0` means one-shot).
    pub fn start(&self, timeout: u64, repeat: u64, cb: impl FnMut(&Timer) + 'static) -> Result<()> {
        if repeat == 0 && self.0.is_active() {
            warn!("waiting for previous timer to finish before starting oneshot timer");
        }
        debug!(timeout, repeat, "timer start");
        self.0.set_supplemental::<TimerCallback>(Box::new(cb));
        let status = unsafe {
            libuv_sys2::uv_timer_start(self.0.uv(), Some(timeout_trampoline), timeout, repeat)
        };
        if status < 0 {
            warn!(status, "timer start failed");
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_timer_stop(self.0.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    /// Stop the timer, then restart it using the repeat value, effectively
    /// rescheduling the next firing without touching the callback.
    pub fn again(&self) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_timer_again(self.0.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn set_repeat(&self, repeat: u64) {
        unsafe { libuv_sys2::uv_timer_set_repeat(self.0.uv(), repeat) };
    }

    pub fn repeat(&self) -> u64 {
        unsafe { libuv_sys2::uv_timer_get_repeat(self.0.uv()) }
    }
}
