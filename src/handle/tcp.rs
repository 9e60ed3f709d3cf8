//! tcp handle

use std::net::SocketAddr;

use tracing::{debug, warn};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::handle::{self, stream, Handle};
use crate::io::{self, output};
use crate::net::RawSockAddr;
use crate::reactor::Loop;

type TcpHandleInner = Handle<libuv_sys2::uv_tcp_t>;

/// A TCP socket, usable as either end of a connection or as a listener.
#[derive(Clone)]
pub struct Tcp(TcpHandleInner);

impl Tcp {
    pub fn new(loop_: &Loop) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_tcp_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_tcp_init(loop_.as_raw(), owner.uv()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &TcpHandleInner {
        &self.0
    }

    pub fn bind(&self, addr: &SocketAddr) -> Result<()> {
        let raw = RawSockAddr::from_socket_addr(addr)?;
        let status = unsafe { libuv_sys2::uv_tcp_bind(self.0.uv(), raw.as_ptr(), 0) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn nodelay(&self, enable: bool) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_tcp_nodelay(self.0.uv(), enable as i32) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn keepalive(&self, enable: bool, delay_secs: u32) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_tcp_keepalive(self.0.uv(), enable as i32, delay_secs) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn simultaneous_accepts(&self, enable: bool) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_tcp_simultaneous_accepts(self.0.uv(), enable as i32) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn listen(&self, backlog: i32, cb: impl FnMut(Result<()>) + 'static) -> Result<()> {
        stream::listen(&self.0, backlog, cb)
    }

    /// Accept a pending connection into a freshly constructed `Tcp` client.
    pub fn accept(&self, loop_: &Loop) -> Result<Tcp> {
        let client = Tcp::new(loop_)?;
        stream::accept(&self.0, &client.0)?;
        Ok(client)
    }

    pub fn shutdown(&self, cb: impl FnOnce(Result<()>) + 'static) -> Result<()> {
        stream::shutdown(&self.0, cb)
    }

    pub fn read_start(&self, cb: impl FnMut(Result<Buffer>) + 'static) -> Result<()> {
        io::read_start(&self.0, cb)
    }

    pub fn read_stop(&self) -> Result<()> {
        io::read_stop(&self.0)
    }

    /// Stop reads when `condition` holds (a high-watermark check on
    /// downstream backlog); a no-op otherwise.
    pub fn read_pause(&self, condition: bool) -> Result<()> {
        io::read_pause(&self.0, condition)
    }

    /// Resume reads when `condition` holds (a low-watermark check on
    /// downstream backlog); a no-op otherwise.
    pub fn read_resume(&self, condition: bool) -> Result<()> {
        io::read_resume(&self.0, condition)
    }

    pub fn write(&self, buffer: Buffer, cb: impl FnOnce(Result<()>) + 'static) -> Result<()> {
        debug!(len = buffer.total_len(), "tcp write submit");
        output::write(self.0.uv(), buffer, cb)
    }

    pub fn try_write(&self, buffer: &Buffer) -> Result<usize> {
        output::try_write(self.0.uv(), buffer)
    }

    /// Bytes queued for writing but not yet handed to the OS, the quantity
    /// the backpressure protocol's HIGH/LOW watermarks are compared against.
    pub fn write_queue_size(&self) -> usize {
        unsafe { (*(self.0.uv() as *mut libuv_sys2::uv_stream_t)).write_queue_size }
    }
}

type OnConnectFn = Box<dyn FnOnce(Result<()>)>;

struct ConnectCtx {
    callback: OnConnectFn,
}

extern "C" fn connect_cb(raw: *mut libuv_sys2::uv_connect_t, status: i32) {
    unsafe {
        let ctx = Box::from_raw((*raw).data as *mut ConnectCtx);
        drop(Box::from_raw(raw));
        let result = if status < 0 {
            warn!(status, "connect_cb failed");
            Err(Error::from_status(status))
        } else {
            debug!("connect_cb connected");
            Ok(())
        };
        (ctx.callback)(result);
    }
}

impl Tcp {
    /// Connect to `addr`, invoking `cb` once the connection completes or
    /// fails.
    pub fn connect(&self, addr: &SocketAddr, cb: impl FnOnce(Result<()>) + 'static) -> Result<()> {
        debug!(%addr, "tcp connect submit");
        let raw = RawSockAddr::from_socket_addr(addr)?;
        let ctx = Box::into_raw(Box::new(ConnectCtx { callback: Box::new(cb) }));
        let mut req: Box<libuv_sys2::uv_connect_t> = Box::new(unsafe { std::mem::zeroed() });
        req.data = ctx as *mut _;
        let req_ptr = Box::into_raw(req);
        let status = unsafe {
            libuv_sys2::uv_tcp_connect(req_ptr, self.0.uv(), raw.as_ptr(), Some(connect_cb))
        };
        if status < 0 {
            warn!(status, "tcp connect submission failed");
            unsafe {
                drop(Box::from_raw(req_ptr));
                drop(Box::from_raw(ctx));
            }
            return Err(Error::from_status(status));
        }
        Ok(())
    }
}
