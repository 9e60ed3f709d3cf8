//! pipe handle
//!
//! A named pipe on Windows, a Unix domain socket everywhere else. Shares
//! its read/write/listen/accept surface with [`crate::handle::tcp::Tcp`]
//! through [`crate::handle::stream`] and [`crate::io`].

use std::ffi::CString;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::handle::{self, stream, Handle};
use crate::io::{self, output};
use crate::reactor::Loop;

type PipeHandleInner = Handle<libuv_sys2::uv_pipe_t>;

#[derive(Clone)]
pub struct Pipe(PipeHandleInner);

impl Pipe {
    pub fn new(loop_: &Loop, ipc: bool) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_pipe_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_pipe_init(loop_.as_raw(), owner.uv(), ipc as i32) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &PipeHandleInner {
        &self.0
    }

    pub fn open(&self, fd: i32) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_pipe_open(self.0.uv(), fd) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn bind(&self, name: &str) -> Result<()> {
        let cname = CString::new(name).expect("pipe name has no interior NUL");
        let status = unsafe { libuv_sys2::uv_pipe_bind(self.0.uv(), cname.as_ptr()) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn listen(&self, backlog: i32, cb: impl FnMut(Result<()>) + 'static) -> Result<()> {
        stream::listen(&self.0, backlog, cb)
    }

    pub fn accept(&self, loop_: &Loop) -> Result<Pipe> {
        let client = Pipe::new(loop_, false)?;
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

    pub fn read_pause(&self, condition: bool) -> Result<()> {
        io::read_pause(&self.0, condition)
    }

    pub fn read_resume(&self, condition: bool) -> Result<()> {
        io::read_resume(&self.0, condition)
    }

    pub fn write(&self, buffer: Buffer, cb: impl FnOnce(Result<()>) + 'static) -> Result<()> {
        output::write(self.0.uv(), buffer, cb)
    }

    pub fn try_write(&self, buffer: &Buffer) -> Result<usize> {
        output::try_write(self.0.uv(), buffer)
    }

    pub fn write_queue_size(&self) -> usize {
        unsafe { (*(self.0.uv() as *mut libuv_sys2::uv_stream_t)).write_queue_size }
    }
}
