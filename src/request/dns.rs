//! dns requests
//!
//! `getaddrinfo`/`getnameinfo` run on the threadpool like the `fs` requests
//! in this module's sibling, completing on the loop thread. Passing no
//! callback is deliberately not supported here -- unlike the engine's own
//! C API, which runs synchronously when handed a null callback, every
//! entry point in this wrapper always submits to the loop.

use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::net::SocketAddr;
use std::os::raw::c_int;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::net::socket_addr_from_storage;
use crate::reactor::Loop;

type OnAddrInfo = Box<dyn FnOnce(Result<Vec<SocketAddr>>)>;

struct AddrInfoCtx {
    _host: Option<CString>,
    _service: Option<CString>,
    callback: OnAddrInfo,
    completed: Rc<Cell<bool>>,
}

extern "C" fn getaddrinfo_cb(
    req: *mut libuv_sys2::uv_getaddrinfo_t,
    status: c_int,
    res: *mut libc::addrinfo,
) {
    unsafe {
        let ctx = Box::from_raw((*req).data as *mut AddrInfoCtx);
        ctx.completed.set(true);
        let result = if status < 0 {
            warn!(status, "getaddrinfo_cb failed");
            Err(Error::from_status(status))
        } else {
            debug!("getaddrinfo_cb resolved");
            Ok(collect_addrs(res))
        };
        libuv_sys2::uv_freeaddrinfo(res);
        drop(Box::from_raw(req));
        (ctx.callback)(result);
    }
}

unsafe fn collect_addrs(mut res: *mut libc::addrinfo) -> Vec<SocketAddr> {
    let mut out = Vec::new();
    while !res.is_null() {
        let entry = &*res;
        if !entry.ai_addr.is_null() {
            let storage = entry.ai_addr as *const libuv_sys2::sockaddr_storage;
            if let Ok(addr) = socket_addr_from_storage(&*storage) {
                out.push(addr);
            }
        }
        res = entry.ai_next;
    }
    out
}

/// A pending `getaddrinfo` request, cancellable via [`GetAddrInfoRequest::cancel`].
pub struct GetAddrInfoRequest {
    req: *mut libuv_sys2::uv_getaddrinfo_t,
    completed: Rc<Cell<bool>>,
}

impl GetAddrInfoRequest {
    /// Ask the engine to cancel this request (`uv_cancel`). A no-op if it
    /// has already completed. The completion callback still fires, carrying
    /// `Error::Cancelled`.
    pub fn cancel(&self) -> Result<()> {
        if self.completed.get() {
            return Ok(());
        }
        let status = unsafe { libuv_sys2::uv_cancel(self.req as *mut libuv_sys2::uv_req_t) };
        if status < 0 {
            warn!(status, "getaddrinfo cancel failed");
            return Err(Error::from_status(status));
        }
        debug!("getaddrinfo cancel submitted");
        Ok(())
    }
}

/// Resolve `host`/`service` (either may be empty, but not both), yielding
/// every address the engine's resolver reports.
pub fn getaddrinfo(
    loop_: &Loop,
    host: Option<&str>,
    service: Option<&str>,
    cb: impl FnOnce(Result<Vec<SocketAddr>>) + 'static,
) -> Result<GetAddrInfoRequest> {
    debug!(host, service, "getaddrinfo submit");
    let chost = host.map(|h| CString::new(h).expect("hostname has no interior NUL"));
    let cservice = service.map(|s| CString::new(s).expect("service has no interior NUL"));
    let host_ptr = chost.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());
    let service_ptr = cservice.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());

    let completed = Rc::new(Cell::new(false));
    let ctx = Box::into_raw(Box::new(AddrInfoCtx {
        _host: chost,
        _service: cservice,
        callback: Box::new(cb),
        completed: completed.clone(),
    }));
    let mut req: Box<libuv_sys2::uv_getaddrinfo_t> = Box::new(unsafe { std::mem::zeroed() });
    req.data = ctx as *mut _;
    let req_ptr = Box::into_raw(req);

    let status = unsafe {
        libuv_sys2::uv_getaddrinfo(
            loop_.as_raw(),
            req_ptr,
            Some(getaddrinfo_cb),
            host_ptr,
            service_ptr,
            std::ptr::null(),
        )
    };
    if status < 0 {
        warn!(status, "getaddrinfo submission failed");
        unsafe {
            drop(Box::from_raw(ctx));
            drop(Box::from_raw(req_ptr));
        }
        return Err(Error::from_status(status));
    }
    Ok(GetAddrInfoRequest { req: req_ptr, completed })
}

type OnNameInfo = Box<dyn FnOnce(Result<(String, String)>)>;

struct NameInfoCtx {
    callback: OnNameInfo,
    completed: Rc<Cell<bool>>,
}

extern "C" fn getnameinfo_cb(
    req: *mut libuv_sys2::uv_getnameinfo_t,
    status: c_int,
    hostname: *const std::os::raw::c_char,
    service: *const std::os::raw::c_char,
) {
    unsafe {
        let ctx = Box::from_raw((*req).data as *mut NameInfoCtx);
        ctx.completed.set(true);
        let result = if status < 0 {
            warn!(status, "getnameinfo_cb failed");
            Err(Error::from_status(status))
        } else {
            debug!("getnameinfo_cb resolved");
            let host = CStr::from_ptr(hostname).to_string_lossy().into_owned();
            let serv = CStr::from_ptr(service).to_string_lossy().into_owned();
            Ok((host, serv))
        };
        drop(Box::from_raw(req));
        (ctx.callback)(result);
    }
}

/// A pending `getnameinfo` request, cancellable via [`GetNameInfoRequest::cancel`].
pub struct GetNameInfoRequest {
    req: *mut libuv_sys2::uv_getnameinfo_t,
    completed: Rc<Cell<bool>>,
}

impl GetNameInfoRequest {
    /// Ask the engine to cancel this request (`uv_cancel`). A no-op if it
    /// has already completed. The completion callback still fires, carrying
    /// `Error::Cancelled`.
    pub fn cancel(&self) -> Result<()> {
        if self.completed.get() {
            return Ok(());
        }
        let status = unsafe { libuv_sys2::uv_cancel(self.req as *mut libuv_sys2::uv_req_t) };
        if status < 0 {
            warn!(status, "getnameinfo cancel failed");
            return Err(Error::from_status(status));
        }
        debug!("getnameinfo cancel submitted");
        Ok(())
    }
}

/// Reverse-resolve a socket address into a host/service pair.
pub fn getnameinfo(
    loop_: &Loop,
    addr: &SocketAddr,
    flags: c_int,
    cb: impl FnOnce(Result<(String, String)>) + 'static,
) -> Result<GetNameInfoRequest> {
    debug!(%addr, "getnameinfo submit");
    let raw = crate::net::RawSockAddr::from_socket_addr(addr)?;

    let completed = Rc::new(Cell::new(false));
    let ctx = Box::into_raw(Box::new(NameInfoCtx { callback: Box::new(cb), completed: completed.clone() }));
    let mut req: Box<libuv_sys2::uv_getnameinfo_t> = Box::new(unsafe { std::mem::zeroed() });
    req.data = ctx as *mut _;
    let req_ptr = Box::into_raw(req);

    let status = unsafe {
        libuv_sys2::uv_getnameinfo(loop_.as_raw(), req_ptr, Some(getnameinfo_cb), raw.as_ptr(), flags)
    };
    if status < 0 {
        warn!(status, "getnameinfo submission failed");
        unsafe {
            drop(Box::from_raw(ctx));
            drop(Box::from_raw(req_ptr));
        }
        return Err(Error::from_status(status));
    }
    Ok(GetNameInfoRequest { req: req_ptr, completed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_resolves_synchronously() {
        let loop_ = Loop::new().expect("loop");
        let done = std::rc::Rc::new(std::cell::Cell::new(false));
        let done2 = done.clone();
        getaddrinfo(&loop_, Some("localhost"), Some("0"), move |result| {
            assert!(result.is_ok());
            done2.set(true);
        })
        .expect("getaddrinfo submit");
        loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).expect("loop run");
        assert!(done.get());
    }

    #[test]
    fn cancel_before_completion_still_fires_the_callback() {
        let loop_ = Loop::new().expect("loop");
        let seen = std::rc::Rc::new(std::cell::Cell::new(false));
        let seen2 = seen.clone();
        let req = getaddrinfo(&loop_, Some("localhost"), Some("0"), move |_result| {
            seen2.set(true);
        })
        .expect("getaddrinfo submit");
        req.cancel().expect("cancel");
        loop_.run(libuv_sys2::uv_run_mode_UV_RUN_DEFAULT).expect("loop run");
        assert!(seen.get());
    }
}
