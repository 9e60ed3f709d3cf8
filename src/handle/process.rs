//! process handle
//!
//! Spawns a child process and notifies on exit. Stdio redirection beyond
//! simple inheritance is left to the caller via raw `uv_process_options_t`
//! construction; this wraps the common case of an inherited standard
//! stream set.

use std::ffi::CString;
use std::os::raw::c_int;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::reactor::Loop;

type OnExitFn = Box<dyn FnMut(&Process, i64, c_int)>;
type ProcessHandleInner = Handle<libuv_sys2::uv_process_t>;

#[derive(Clone)]
pub struct Process(ProcessHandleInner);

extern "C" fn exit_trampoline(
    raw: *mut libuv_sys2::uv_process_t,
    exit_status: i64,
    term_signal: c_int,
) {
    unsafe {
        debug!(exit_status, term_signal, "process exited");
        let instance = Instance::from_raw(raw);
        let ptr = instance as *mut Instance<libuv_sys2::uv_process_t>;
        handle::incref(ptr);
        let owner = Process(Handle::from_ptr(ptr));
        if let Some(cb) = owner.0.supplemental_mut::<OnExitFn>() {
            cb(&owner, exit_status, term_signal);
        }
    }
}

impl Process {
    /// Spawn `file` with `args` (not including argv[0], which is `file`
    /// itself), inheriting the parent's standard streams, invoking `on_exit`
    /// when the child terminates.
    pub fn spawn(
        loop_: &Loop,
        file: &str,
        args: &[&str],
        on_exit: impl FnMut(&Process, i64, c_int) + 'static,
    ) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_process_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        owner.set_supplemental::<OnExitFn>(Box::new(on_exit));

        let c_file = CString::new(file).expect("program path has no interior NUL");
        let mut c_args: Vec<CString> = std::iter::once(file)
            .chain(args.iter().copied())
            .map(|s| CString::new(s).expect("argument has no interior NUL"))
            .collect();
        let mut argv: Vec<*mut std::os::raw::c_char> =
            c_args.iter_mut().map(|s| s.as_ptr() as *mut _).collect();
        argv.push(std::ptr::null_mut());

        let mut options: libuv_sys2::uv_process_options_t = unsafe { std::mem::zeroed() };
        options.file = c_file.as_ptr();
        options.args = argv.as_mut_ptr();
        options.exit_cb = Some(exit_trampoline);

        debug!(file, "process spawn");
        let status = unsafe { libuv_sys2::uv_spawn(loop_.as_raw(), owner.uv(), &options) };
        if status < 0 {
            warn!(status, "spawn failed");
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &ProcessHandleInner {
        &self.0
    }

    pub fn pid(&self) -> c_int {
        unsafe { (*self.0.uv()).pid }
    }

    pub fn kill(&self, signum: c_int) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_process_kill(self.0.uv(), signum) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }
}
