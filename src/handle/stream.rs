//! stream
//!
//! Operations shared by every connection-oriented stream handle: tcp,
//! pipe, and tty all embed a `uv_stream_t` as their first field and so can
//! listen, accept, and shut down through the same engine entry points.

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::io::AsStream;

type OnConnectionFn = Box<dyn FnMut(Result<()>)>;

extern "C" fn connection_cb<R: AsStream>(raw: *mut libuv_sys2::uv_stream_t, status: i32) {
    unsafe {
        let instance = Instance::from_raw(raw as *mut R);
        let ptr = instance as *mut Instance<R>;
        handle::incref(ptr);
        let _keep_alive = Handle::<R>::from_ptr(ptr);
        if let Some(cb) = instance.supplemental.get_mut().as_mut().and_then(|x| x.downcast_mut::<OnConnectionFn>()) {
            let result = if status < 0 {
                warn!(status, "connection_cb failed");
                Err(Error::from_status(status))
            } else {
                trace!("connection_cb pending connection");
                Ok(())
            };
            cb(result);
        }
    }
}

/// Start listening for incoming connections. `cb` is invoked once per
/// pending connection; the handler should call [`accept`] from inside it.
pub(crate) fn listen<R: AsStream>(
    handle: &Handle<R>,
    backlog: i32,
    cb: impl FnMut(Result<()>) + 'static,
) -> Result<()> {
    debug!(backlog, "listen");
    handle.set_supplemental::<OnConnectionFn>(Box::new(cb));
    let stream = handle.uv() as *mut libuv_sys2::uv_stream_t;
    let status = unsafe { libuv_sys2::uv_listen(stream, backlog, Some(connection_cb::<R>)) };
    if status < 0 {
        warn!(status, "listen failed");
        return Err(Error::from_status(status));
    }
    Ok(())
}

/// Accept a pending connection on `server` into the freshly constructed,
/// not-yet-connected `client` handle.
pub(crate) fn accept<S: AsStream, C: AsStream>(server: &Handle<S>, client: &Handle<C>) -> Result<()> {
    let server_stream = server.uv() as *mut libuv_sys2::uv_stream_t;
    let client_stream = client.uv() as *mut libuv_sys2::uv_stream_t;
    let status = unsafe { libuv_sys2::uv_accept(server_stream, client_stream) };
    if status < 0 {
        warn!(status, "accept failed");
        return Err(Error::from_status(status));
    }
    debug!("accept succeeded");
    Ok(())
}

type OnShutdownFn = Box<dyn FnOnce(Result<()>)>;

struct ShutdownCtx {
    callback: OnShutdownFn,
}

extern "C" fn shutdown_cb(raw: *mut libuv_sys2::uv_shutdown_t, status: i32) {
    unsafe {
        let ctx = Box::from_raw((*raw).data as *mut ShutdownCtx);
        drop(Box::from_raw(raw));
        let result = if status < 0 {
            warn!(status, "shutdown_cb failed");
            Err(Error::from_status(status))
        } else {
            debug!("shutdown_cb completed");
            Ok(())
        };
        (ctx.callback)(result);
    }
}

/// Gracefully half-close the write side of the stream once all queued
/// writes have drained.
pub(crate) fn shutdown<R: AsStream>(
    handle: &Handle<R>,
    cb: impl FnOnce(Result<()>) + 'static,
) -> Result<()> {
    debug!("shutdown submit");
    let ctx = Box::into_raw(Box::new(ShutdownCtx { callback: Box::new(cb) }));
    let mut req: Box<libuv_sys2::uv_shutdown_t> = Box::new(unsafe { std::mem::zeroed() });
    req.data = ctx as *mut _;
    let req_ptr = Box::into_raw(req);
    let stream = handle.uv() as *mut libuv_sys2::uv_stream_t;
    let status = unsafe { libuv_sys2::uv_shutdown(req_ptr, stream, Some(shutdown_cb)) };
    if status < 0 {
        warn!(status, "shutdown submission failed");
        unsafe {
            drop(Box::from_raw(req_ptr));
            drop(Box::from_raw(ctx));
        }
        return Err(Error::from_status(status));
    }
    Ok(())
}
