//! fs request
//!
//! One-shot filesystem operations, each submitted against a loop rather
//! than a persistent handle -- there is no engine concept of an "open file
//! handle" the way there is for a socket; `uv_fs_t` is purely a completion
//! token for a single call.

use std::cell::Cell;
use std::ffi::CString;
use std::os::raw::c_int;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::reactor::Loop;

type FsCompletion = Box<dyn FnOnce(&libuv_sys2::uv_fs_t)>;

struct FsCtx {
    // Keeps any path/buffer arguments alive until the callback has run;
    // libuv's threadpool touches them for the duration of the request.
    _keep_alive: Box<dyn std::any::Any>,
    callback: FsCompletion,
    completed: Rc<Cell<bool>>,
}

extern "C" fn fs_cb(req: *mut libuv_sys2::uv_fs_t) {
    unsafe {
        let ctx = Box::from_raw((*req).data as *mut FsCtx);
        ctx.completed.set(true);
        (ctx.callback)(&*req);
        libuv_sys2::uv_fs_req_cleanup(req);
        drop(Box::from_raw(req));
    }
}

/// A pending filesystem request, returned by every submission function in
/// this module so it can be cancelled before it completes.
pub struct FsRequest {
    req: *mut libuv_sys2::uv_fs_t,
    completed: Rc<Cell<bool>>,
}

impl FsRequest {
    /// Ask the engine to cancel this request (`uv_cancel`). A no-op if the
    /// request has already completed. Cancellation is asynchronous: the
    /// completion callback still fires, carrying `Error::Cancelled`.
    pub fn cancel(&self) -> Result<()> {
        if self.completed.get() {
            return Ok(());
        }
        let status = unsafe { libuv_sys2::uv_cancel(self.req as *mut libuv_sys2::uv_req_t) };
        if status < 0 {
            warn!(status, "fs cancel failed");
            return Err(Error::from_status(status));
        }
        debug!("fs cancel submitted");
        Ok(())
    }
}

fn alloc_req(keep_alive: Box<dyn std::any::Any>, cb: FsCompletion) -> (*mut libuv_sys2::uv_fs_t, Rc<Cell<bool>>) {
    let completed = Rc::new(Cell::new(false));
    let ctx = Box::into_raw(Box::new(FsCtx { _keep_alive: keep_alive, callback: cb, completed: completed.clone() }));
    let mut req: Box<libuv_sys2::uv_fs_t> = Box::new(unsafe { std::mem::zeroed() });
    req.data = ctx as *mut _;
    (Box::into_raw(req), completed)
}

unsafe fn fail(req: *mut libuv_sys2::uv_fs_t, status: c_int) -> Error {
    let ctx = Box::from_raw((*req).data as *mut FsCtx);
    drop(ctx);
    drop(Box::from_raw(req));
    Error::from_status(status)
}

/// Open (and possibly create) a file, yielding its file descriptor.
pub fn open(
    loop_: &Loop,
    path: &str,
    flags: c_int,
    mode: c_int,
    cb: impl FnOnce(Result<c_int>) + 'static,
) -> Result<FsRequest> {
    debug!(path, "fs open submit");
    let cpath = CString::new(path).expect("path has no interior NUL");
    let ptr = cpath.as_ptr();
    let (req, completed) = alloc_req(
        Box::new(cpath),
        Box::new(move |r| {
            let result = r.result;
            cb(if result < 0 {
                Err(Error::from_status(result as c_int))
            } else {
                Ok(result as c_int)
            })
        }),
    );
    let status = unsafe { libuv_sys2::uv_fs_open(loop_.as_raw(), req, ptr, flags, mode, Some(fs_cb)) };
    if status < 0 {
        warn!(status, "fs open submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

pub fn close(loop_: &Loop, fd: c_int, cb: impl FnOnce(Result<()>) + 'static) -> Result<FsRequest> {
    debug!(fd, "fs close submit");
    let (req, completed) = alloc_req(
        Box::new(()),
        Box::new(move |r| {
            cb(if r.result < 0 {
                Err(Error::from_status(r.result as c_int))
            } else {
                Ok(())
            })
        }),
    );
    let status = unsafe { libuv_sys2::uv_fs_close(loop_.as_raw(), req, fd, Some(fs_cb)) };
    if status < 0 {
        warn!(status, "fs close submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

/// Read up to `buffer`'s length at `offset` (`-1` for the current position).
pub fn read(
    loop_: &Loop,
    fd: c_int,
    buffer: Buffer,
    offset: i64,
    cb: impl FnOnce(Result<Buffer>) + 'static,
) -> Result<FsRequest> {
    debug!(fd, offset, "fs read submit");
    let bufs = buffer.as_uv_bufs();
    let (req, completed) = alloc_req(
        Box::new(buffer.clone()),
        Box::new(move |r| {
            let n = r.result;
            cb(if n < 0 {
                Err(Error::from_status(n as c_int))
            } else {
                buffer.set_len(0, n as usize);
                Ok(buffer)
            })
        }),
    );
    let status = unsafe {
        libuv_sys2::uv_fs_read(loop_.as_raw(), req, fd, bufs.as_ptr(), bufs.len() as u32, offset, Some(fs_cb))
    };
    if status < 0 {
        warn!(status, "fs read submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

pub fn write(
    loop_: &Loop,
    fd: c_int,
    buffer: Buffer,
    offset: i64,
    cb: impl FnOnce(Result<usize>) + 'static,
) -> Result<FsRequest> {
    debug!(fd, offset, "fs write submit");
    let bufs = buffer.as_uv_bufs();
    let (req, completed) = alloc_req(
        Box::new(buffer),
        Box::new(move |r| {
            cb(if r.result < 0 {
                Err(Error::from_status(r.result as c_int))
            } else {
                Ok(r.result as usize)
            })
        }),
    );
    let status = unsafe {
        libuv_sys2::uv_fs_write(loop_.as_raw(), req, fd, bufs.as_ptr(), bufs.len() as u32, offset, Some(fs_cb))
    };
    if status < 0 {
        warn!(status, "fs write submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

pub fn unlink(loop_: &Loop, path: &str, cb: impl FnOnce(Result<()>) + 'static) -> Result<FsRequest> {
    debug!(path, "fs unlink submit");
    let cpath = CString::new(path).expect("path has no interior NUL");
    let ptr = cpath.as_ptr();
    let (req, completed) = alloc_req(Box::new(cpath), Box::new(move |r| cb(ok_or_status(r))));
    let status = unsafe { libuv_sys2::uv_fs_unlink(loop_.as_raw(), req, ptr, Some(fs_cb)) };
    if status < 0 {
        warn!(status, "fs unlink submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

pub fn mkdir(loop_: &Loop, path: &str, mode: c_int, cb: impl FnOnce(Result<()>) + 'static) -> Result<FsRequest> {
    debug!(path, "fs mkdir submit");
    let cpath = CString::new(path).expect("path has no interior NUL");
    let ptr = cpath.as_ptr();
    let (req, completed) = alloc_req(Box::new(cpath), Box::new(move |r| cb(ok_or_status(r))));
    let status = unsafe { libuv_sys2::uv_fs_mkdir(loop_.as_raw(), req, ptr, mode, Some(fs_cb)) };
    if status < 0 {
        warn!(status, "fs mkdir submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

pub fn rmdir(loop_: &Loop, path: &str, cb: impl FnOnce(Result<()>) + 'static) -> Result<FsRequest> {
    debug!(path, "fs rmdir submit");
    let cpath = CString::new(path).expect("path has no interior NUL");
    let ptr = cpath.as_ptr();
    let (req, completed) = alloc_req(Box::new(cpath), Box::new(move |r| cb(ok_or_status(r))));
    let status = unsafe { libuv_sys2::uv_fs_rmdir(loop_.as_raw(), req, ptr, Some(fs_cb)) };
    if status < 0 {
        warn!(status, "fs rmdir submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

pub fn rename(
    loop_: &Loop,
    from: &str,
    to: &str,
    cb: impl FnOnce(Result<()>) + 'static,
) -> Result<FsRequest> {
    debug!(from, to, "fs rename submit");
    let cfrom = CString::new(from).expect("path has no interior NUL");
    let cto = CString::new(to).expect("path has no interior NUL");
    let from_ptr = cfrom.as_ptr();
    let to_ptr = cto.as_ptr();
    let (req, completed) = alloc_req(Box::new((cfrom, cto)), Box::new(move |r| cb(ok_or_status(r))));
    let status =
        unsafe { libuv_sys2::uv_fs_rename(loop_.as_raw(), req, from_ptr, to_ptr, Some(fs_cb)) };
    if status < 0 {
        warn!(status, "fs rename submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

pub fn stat(loop_: &Loop, path: &str, cb: impl FnOnce(Result<libuv_sys2::uv_stat_t>) + 'static) -> Result<FsRequest> {
    debug!(path, "fs stat submit");
    let cpath = CString::new(path).expect("path has no interior NUL");
    let ptr = cpath.as_ptr();
    let (req, completed) = alloc_req(
        Box::new(cpath),
        Box::new(move |r| {
            cb(if r.result < 0 {
                Err(Error::from_status(r.result as c_int))
            } else {
                Ok(r.statbuf)
            })
        }),
    );
    let status = unsafe { libuv_sys2::uv_fs_stat(loop_.as_raw(), req, ptr, Some(fs_cb)) };
    if status < 0 {
        warn!(status, "fs stat submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

pub fn fstat(
    loop_: &Loop,
    fd: c_int,
    cb: impl FnOnce(Result<libuv_sys2::uv_stat_t>) + 'static,
) -> Result<FsRequest> {
    debug!(fd, "fs fstat submit");
    let (req, completed) = alloc_req(
        Box::new(()),
        Box::new(move |r| {
            cb(if r.result < 0 {
                Err(Error::from_status(r.result as c_int))
            } else {
                Ok(r.statbuf)
            })
        }),
    );
    let status = unsafe { libuv_sys2::uv_fs_fstat(loop_.as_raw(), req, fd, Some(fs_cb)) };
    if status < 0 {
        warn!(status, "fs fstat submission failed");
        return Err(unsafe { fail(req, status) });
    }
    Ok(FsRequest { req, completed })
}

fn ok_or_status(r: &libuv_sys2::uv_fs_t) -> Result<()> {
    if r.result < 0 {
        Err(Error::from_status(r.result as c_int))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn write_then_read_round_trips_through_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.txt");
        let path = path.to_str().unwrap().to_string();

        let loop_ = Loop::new().unwrap();
        let written = Rc::new(RefCell::new(0usize));
        let read_back = Rc::new(RefCell::new(Vec::new()));

        let w = written.clone();
        let path_for_write = path.clone();
        let loop_for_open = loop_.clone();
        open(&loop_, &path, libc::O_CREAT | libc::O_WRONLY, 0o644, move |result| {
            let fd = result.expect("open for write");
            let buffer = Buffer::from(b"hello fs".to_vec());
            write(&loop_for_open, fd, buffer, 0, move |result| {
                *w.borrow_mut() = result.expect("write");
                close(&loop_for_open, fd, |_| {}).unwrap();
            })
            .unwrap();
        })
        .unwrap();
        loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).unwrap();
        assert_eq!(*written.borrow(), 8);

        let r = read_back.clone();
        let loop_for_read = loop_.clone();
        open(&loop_, &path_for_write, libc::O_RDONLY, 0, move |result| {
            let fd = result.expect("open for read");
            let buffer = Buffer::with_capacity(64);
            read(&loop_for_read, fd, buffer, 0, move |result| {
                let buf = result.expect("read");
                r.borrow_mut().extend_from_slice(buf.as_slice(0));
                close(&loop_for_read, fd, |_| {}).unwrap();
            })
            .unwrap();
        })
        .unwrap();
        loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).unwrap();
        assert_eq!(&*read_back.borrow(), b"hello fs");
    }

    #[test]
    fn cancel_before_completion_still_fires_the_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancel-me.txt");
        let path = path.to_str().unwrap().to_string();

        let loop_ = Loop::new().unwrap();
        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();

        let req = open(&loop_, &path, libc::O_CREAT | libc::O_WRONLY, 0o644, move |result| {
            *s.borrow_mut() = Some(result.is_ok());
        })
        .unwrap();
        req.cancel().unwrap();
        loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).unwrap();
        assert!(seen.borrow().is_some(), "completion callback must still fire after cancel");
    }

    #[test]
    fn cancel_after_completion_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("already-done.txt");
        let path = path.to_str().unwrap().to_string();

        let loop_ = Loop::new().unwrap();
        let req = open(&loop_, &path, libc::O_CREAT | libc::O_WRONLY, 0o644, |_| {}).unwrap();
        loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).unwrap();
        req.cancel().unwrap();
    }
}
