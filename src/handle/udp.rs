//! udp handle

use std::net::SocketAddr;

use tracing::{debug, trace, warn};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::handle::{self, Handle, Instance};
use crate::net::RawSockAddr;
use crate::reactor::Loop;

type UdpHandleInner = Handle<libuv_sys2::uv_udp_t>;

#[derive(Clone)]
pub struct Udp(UdpHandleInner);

impl Udp {
    pub fn new(loop_: &Loop) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_udp_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_udp_init(loop_.as_raw(), owner.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &UdpHandleInner {
        &self.0
    }

    pub fn bind(&self, addr: &SocketAddr, reuseaddr: bool) -> Result<()> {
        let raw = RawSockAddr::from_socket_addr(addr)?;
        let flags = if reuseaddr { libuv_sys2::UV_UDP_REUSEADDR } else { 0 };
        let status = unsafe { libuv_sys2::uv_udp_bind(self.0.uv(), raw.as_ptr(), flags) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    /// Send `buffer` to `addr`, invoking `cb` exactly once on completion.
    pub fn send(
        &self,
        addr: &SocketAddr,
        buffer: Buffer,
        cb: impl FnOnce(Result<()>) + 'static,
    ) -> Result<()> {
        debug!(%addr, len = buffer.total_len(), "udp send submit");
        let raw = RawSockAddr::from_socket_addr(addr)?;
        let bufs = buffer.as_uv_bufs();
        let ctx = Box::into_raw(Box::new(SendCtx {
            _buffer: buffer,
            callback: Box::new(cb),
        }));
        let mut req: Box<libuv_sys2::uv_udp_send_t> = Box::new(unsafe { std::mem::zeroed() });
        req.data = ctx as *mut _;
        let req_ptr = Box::into_raw(req);
        let status = unsafe {
            libuv_sys2::uv_udp_send(
                req_ptr,
                self.0.uv(),
                bufs.as_ptr(),
                bufs.len() as u32,
                raw.as_ptr(),
                Some(send_cb),
            )
        };
        if status < 0 {
            warn!(status, "udp send submission failed");
            unsafe {
                drop(Box::from_raw(req_ptr));
                drop(Box::from_raw(ctx));
            }
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn try_send(&self, addr: &SocketAddr, buffer: &Buffer) -> Result<usize> {
        let raw = RawSockAddr::from_socket_addr(addr)?;
        let bufs = buffer.as_uv_bufs();
        let n = unsafe {
            libuv_sys2::uv_udp_try_send(self.0.uv(), bufs.as_ptr(), bufs.len() as u32, raw.as_ptr())
        };
        if n == libuv_sys2::UV_EAGAIN as i32 {
            return Err(Error::WouldBlock);
        }
        if n < 0 {
            return Err(Error::from_status(n));
        }
        Ok(n as usize)
    }

    /// Start receiving datagrams. `cb` receives `None` once per empty UDP
    /// packet (equivalent to libuv delivering `nread == 0` with no
    /// address), and `Some((buffer, from))` for every non-empty one.
    pub fn recv_start(
        &self,
        cb: impl FnMut(Result<(Buffer, SocketAddr)>) + 'static,
    ) -> Result<()> {
        debug!("udp recv_start");
        self.0.set_supplemental::<RecvState>(RecvState {
            callback: Box::new(cb),
            pending: None,
        });
        let status = unsafe {
            libuv_sys2::uv_udp_recv_start(self.0.uv(), Some(udp_alloc_cb), Some(udp_recv_cb))
        };
        if status < 0 {
            warn!(status, "udp recv_start failed");
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn recv_stop(&self) -> Result<()> {
        debug!("udp recv_stop");
        let status = unsafe { libuv_sys2::uv_udp_recv_stop(self.0.uv()) };
        if status < 0 {
            warn!(status, "udp recv_stop failed");
            return Err(Error::from_status(status));
        }
        Ok(())
    }
}

type OnSendFn = Box<dyn FnOnce(Result<()>)>;

struct SendCtx {
    _buffer: Buffer,
    callback: OnSendFn,
}

extern "C" fn send_cb(raw: *mut libuv_sys2::uv_udp_send_t, status: i32) {
    unsafe {
        let ctx = Box::from_raw((*raw).data as *mut SendCtx);
        drop(Box::from_raw(raw));
        let result = if status < 0 {
            warn!(status, "udp send_cb failed");
            Err(Error::from_status(status))
        } else {
            trace!("udp send_cb completed");
            Ok(())
        };
        (ctx.callback)(result);
    }
}

type OnRecvFn = Box<dyn FnMut(Result<(Buffer, SocketAddr)>)>;

struct RecvState {
    callback: OnRecvFn,
    pending: Option<Buffer>,
}

extern "C" fn udp_alloc_cb(
    raw: *mut libuv_sys2::uv_handle_t,
    suggested_size: usize,
    buf: *mut libuv_sys2::uv_buf_t,
) {
    unsafe {
        let instance = Instance::from_raw(raw as *mut libuv_sys2::uv_udp_t);
        let b = Buffer::with_capacity(suggested_size);
        *buf = libuv_sys2::uv_buf_t {
            base: b.base(0) as _,
            len: b.len(0) as _,
        };
        if let Some(state) = instance.supplemental.get_mut().as_mut().and_then(|x| x.downcast_mut::<RecvState>()) {
            state.pending = Some(b);
        }
    }
}

extern "C" fn udp_recv_cb(
    raw: *mut libuv_sys2::uv_udp_t,
    nread: isize,
    _buf: *const libuv_sys2::uv_buf_t,
    addr: *const libuv_sys2::sockaddr,
    _flags: u32,
) {
    unsafe {
        let instance = Instance::from_raw(raw);
        let ptr = instance as *mut Instance<libuv_sys2::uv_udp_t>;
        handle::incref(ptr);
        let _keep_alive = Handle::<libuv_sys2::uv_udp_t>::from_ptr(ptr);
        let state = match instance.supplemental.get_mut().as_mut().and_then(|x| x.downcast_mut::<RecvState>()) {
            Some(s) => s,
            None => return,
        };
        let pending = state.pending.take();
        if nread == 0 && addr.is_null() {
            // No more datagrams queued right now; nothing to deliver.
            return;
        }
        match nread {
            n if n > 0 => {
                if let (Some(buf), false) = (pending, addr.is_null()) {
                    buf.set_len(0, n as usize);
                    match crate::net::socket_addr_from_storage(&*(addr as *const libuv_sys2::sockaddr_storage)) {
                        Ok(from) => (state.callback)(Ok((buf, from))),
                        Err(e) => (state.callback)(Err(e)),
                    }
                }
            }
            n => {
                warn!(status = n as i32, "udp_recv_cb failed");
                (state.callback)(Err(Error::from_status(n as i32)));
            }
        }
    }
}
