//! io
//!
//! Continuous reads and their backpressure control, shared by every
//! stream-like handle (tcp, pipe, tty). libuv already serializes every
//! callback onto the loop thread, so unlike a completion-port driven
//! design there is no cross-thread completion queue to coordinate: each
//! `alloc_cb`/`read_cb` pair runs back-to-back and the user's callback is
//! invoked directly from inside `read_cb`.

pub mod output;

use tracing::{debug, trace, warn};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};

/// Marker for the engine structs that begin with a `uv_stream_t` prefix
/// and therefore support `uv_read_start`/`uv_read_stop`.
pub trait AsStream {}

impl AsStream for libuv_sys2::uv_tcp_t {}
impl AsStream for libuv_sys2::uv_pipe_t {}
impl AsStream for libuv_sys2::uv_tty_t {}

pub(crate) type OnReadFn = Box<dyn FnMut(Result<Buffer>)>;

struct ReadState {
    callback: OnReadFn,
    pending: Option<Buffer>,
    /// Whether this instance currently holds the extra "reading" reference
    /// taken by [`arm`] and released by [`read_stop`] -- set once per
    /// start/stop pair regardless of how many times the read is
    /// paused/resumed in between.
    active: bool,
}

extern "C" fn alloc_cb<R: AsStream>(
    raw: *mut libuv_sys2::uv_handle_t,
    suggested_size: usize,
    buf: *mut libuv_sys2::uv_buf_t,
) {
    unsafe {
        let instance = Instance::from_raw(raw as *mut R);
        let b = Buffer::with_capacity(suggested_size);
        *buf = libuv_sys2::uv_buf_t {
            base: b.base(0) as _,
            len: b.len(0) as _,
        };
        if let Some(state) = instance.supplemental.get_mut().as_mut().and_then(|x| x.downcast_mut::<ReadState>()) {
            state.pending = Some(b);
        }
    }
}

extern "C" fn read_cb<R: AsStream>(
    raw: *mut libuv_sys2::uv_stream_t,
    nread: isize,
    _suggested: *const libuv_sys2::uv_buf_t,
) {
    unsafe {
        let instance = Instance::from_raw(raw as *mut R);
        let ptr = instance as *mut Instance<R>;
        handle::incref(ptr);
        let _keep_alive = Handle::<R>::from_ptr(ptr);
        let state = match instance.supplemental.get_mut().as_mut().and_then(|x| x.downcast_mut::<ReadState>()) {
            Some(s) => s,
            None => return,
        };
        let pending = state.pending.take();
        match nread {
            n if n > 0 => {
                trace!(nread = n, "read_cb delivering chunk");
                if let Some(buf) = pending {
                    buf.set_len(0, n as usize);
                    (state.callback)(Ok(buf));
                }
            }
            n if n == libuv_sys2::UV_EOF as isize => {
                debug!("read_cb end of stream");
                (state.callback)(Err(Error::EndOfStream));
            }
            n => {
                warn!(status = n as i32, "read_cb failed");
                (state.callback)(Err(Error::from_status(n as i32)));
            }
        }
    }
}

/// Arm (or re-arm) continuous reads on `handle`, taking the "reading-active"
/// reference exactly once per start/stop pair: an `incref` up front, undone
/// immediately if a read was already active (so repeated starts don't
/// accumulate references), leaving the instance holding one extra reference
/// for as long as reads stay active. This is what lets a caller drop their
/// last `Handle` clone while a read is armed without the instance closing
/// out from under the pending `read_cb` calls.
fn arm<R: AsStream>(handle: &Handle<R>) -> Result<()> {
    let ptr = handle.0.as_ptr();
    handle::incref(ptr);
    let was_active = unsafe { handle.supplemental_mut::<ReadState>() }
        .map(|s| s.active)
        .unwrap_or(false);
    if was_active {
        let stream = handle.uv() as *mut libuv_sys2::uv_stream_t;
        unsafe { libuv_sys2::uv_read_stop(stream) };
        handle::decref(ptr);
    }
    if let Some(state) = unsafe { handle.supplemental_mut::<ReadState>() } {
        state.active = true;
    }
    let stream = handle.uv() as *mut libuv_sys2::uv_stream_t;
    let status = unsafe { libuv_sys2::uv_read_start(stream, Some(alloc_cb::<R>), Some(read_cb::<R>)) };
    if status < 0 {
        warn!(status, "uv_read_start failed");
        if let Some(state) = unsafe { handle.supplemental_mut::<ReadState>() } {
            state.active = false;
        }
        handle::decref(ptr);
        return Err(Error::from_status(status));
    }
    Ok(())
}

/// Begin continuous reads, invoking `cb` with each chunk as it arrives (or
/// with an error, including end-of-stream).
pub(crate) fn read_start<R: AsStream>(
    handle: &Handle<R>,
    cb: impl FnMut(Result<Buffer>) + 'static,
) -> Result<()> {
    debug!("read_start");
    handle.set_supplemental(ReadState {
        callback: Box::new(cb),
        pending: None,
        active: false,
    });
    arm(handle)
}

/// Stop continuous reads. The registered callback is retained, so a later
/// [`read_resume`] (or a fresh [`read_start`]) picks up where it left off.
/// Releases the reading-active reference taken by [`arm`], exactly once.
pub(crate) fn read_stop<R: AsStream>(handle: &Handle<R>) -> Result<()> {
    debug!("read_stop");
    let stream = handle.uv() as *mut libuv_sys2::uv_stream_t;
    let status = unsafe { libuv_sys2::uv_read_stop(stream) };
    if status < 0 {
        warn!(status, "uv_read_stop failed");
        return Err(Error::from_status(status));
    }
    let was_active = unsafe { handle.supplemental_mut::<ReadState>() }
        .map(|s| {
            let was = s.active;
            s.active = false;
            was
        })
        .unwrap_or(false);
    if was_active {
        handle::decref(handle.0.as_ptr());
    }
    Ok(())
}

/// Pause delivery without discarding the registered callback, but only
/// when `condition` holds -- the caller's own high-watermark check (e.g.
/// `out.write_queue_bytes() >= HIGH`). A no-op when `condition` is false,
/// so callers can call this unconditionally after every write submission.
pub(crate) fn read_pause<R: AsStream>(handle: &Handle<R>, condition: bool) -> Result<()> {
    if !condition {
        return Ok(());
    }
    read_stop(handle)
}

/// Resume delivery using whatever callback was last registered with
/// [`read_start`], but only when `condition` holds (the caller's own
/// low-watermark check). A no-op when `condition` is false, or when no
/// read was ever started (nothing to resume, and nothing to ref).
pub(crate) fn read_resume<R: AsStream>(handle: &Handle<R>, condition: bool) -> Result<()> {
    if !condition {
        return Ok(());
    }
    if unsafe { handle.supplemental_mut::<ReadState>() }.is_none() {
        return Ok(());
    }
    debug!("read_resume");
    arm(handle)
}
