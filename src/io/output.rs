//! output
//!
//! The write side of every stream-like handle funnels through
//! `uv_write`, which takes a uniform `uv_write_t` request regardless of
//! which stream variant it targets. UDP and filesystem writes use their
//! own engine calls (`uv_udp_send`, `uv_fs_write`) and get their own
//! request types in [`crate::request`]; this module is the shared part.

use tracing::{debug, trace, warn};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::io::AsStream;

type OnWriteFn = Box<dyn FnOnce(Result<()>)>;

struct WriteCtx {
    _buffer: Buffer,
    callback: OnWriteFn,
}

extern "C" fn write_cb(raw: *mut libuv_sys2::uv_write_t, status: i32) {
    unsafe {
        let ctx = Box::from_raw((*raw).data as *mut WriteCtx);
        let req = Box::from_raw(raw);
        drop(req);
        let result = if status < 0 {
            warn!(status, "write_cb failed");
            Err(Error::from_status(status))
        } else {
            trace!("write_cb completed");
            Ok(())
        };
        (ctx.callback)(result);
    }
}

/// Submit a write of `buffer`'s segments against any stream-like handle,
/// invoking `cb` exactly once on completion. `buffer` is kept alive until
/// then: the testable property that a buffer has at least one live owner
/// when the completion callback is entered holds by construction, since
/// `WriteCtx` itself carries the clone.
pub(crate) fn write<R: AsStream>(
    uv_handle: *mut R,
    buffer: Buffer,
    cb: impl FnOnce(Result<()>) + 'static,
) -> Result<()> {
    debug!(len = buffer.total_len(), "write submit");
    let bufs = buffer.as_uv_bufs();
    let ctx = Box::new(WriteCtx {
        _buffer: buffer,
        callback: Box::new(cb),
    });
    let ctx_ptr = Box::into_raw(ctx);
    let mut req: Box<libuv_sys2::uv_write_t> = Box::new(unsafe { std::mem::zeroed() });
    req.data = ctx_ptr as *mut _;
    let req_ptr = Box::into_raw(req);
    let stream = uv_handle as *mut libuv_sys2::uv_stream_t;
    let status = unsafe {
        libuv_sys2::uv_write(
            req_ptr,
            stream,
            bufs.as_ptr(),
            bufs.len() as u32,
            Some(write_cb),
        )
    };
    if status < 0 {
        warn!(status, "write submission failed");
        unsafe {
            drop(Box::from_raw(req_ptr));
            drop(Box::from_raw(ctx_ptr));
        }
        return Err(Error::from_status(status));
    }
    Ok(())
}

/// Attempt a non-blocking write; returns the number of bytes accepted
/// without going through the engine's request/callback machinery, or
/// [`Error::WouldBlock`] if none could be written immediately.
pub(crate) fn try_write<R: AsStream>(uv_handle: *mut R, buffer: &Buffer) -> Result<usize> {
    let bufs = buffer.as_uv_bufs();
    let stream = uv_handle as *mut libuv_sys2::uv_stream_t;
    let n = unsafe { libuv_sys2::uv_try_write(stream, bufs.as_ptr(), bufs.len() as u32) };
    if n == libuv_sys2::UV_EAGAIN as i32 {
        trace!("try_write would block");
        return Err(Error::WouldBlock);
    }
    if n < 0 {
        warn!(status = n, "try_write failed");
        return Err(Error::from_status(n));
    }
    trace!(n, "try_write accepted bytes");
    Ok(n as usize)
}
