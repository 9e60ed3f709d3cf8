//! tty handle
//!
//! Wraps a console file descriptor as a readable/writable stream, sharing
//! its I/O surface with [`crate::handle::tcp::Tcp`] and
//! [`crate::handle::pipe::Pipe`].

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::handle::{self, Handle};
use crate::io::{self, output};
use crate::reactor::Loop;

type TtyHandleInner = Handle<libuv_sys2::uv_tty_t>;

#[derive(Clone)]
pub struct Tty(TtyHandleInner);

impl Tty {
    pub fn new(loop_: &Loop, fd: i32, readable: bool) -> Result<Self> {
        let ptr = handle::create::<libuv_sys2::uv_tty_t>(loop_);
        let owner = Handle::from_ptr(ptr);
        let status = unsafe { libuv_sys2::uv_tty_init(loop_.as_raw(), owner.uv(), fd, readable as i32) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(Self(owner))
    }

    pub fn handle(&self) -> &TtyHandleInner {
        &self.0
    }

    pub fn set_mode(&self, mode: libuv_sys2::uv_tty_mode_t) -> Result<()> {
        let status = unsafe { libuv_sys2::uv_tty_set_mode(self.0.uv(), mode) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok(())
    }

    pub fn window_size(&self) -> Result<(i32, i32)> {
        let (mut width, mut height) = (0, 0);
        let status = unsafe { libuv_sys2::uv_tty_get_winsize(self.0.uv(), &mut width, &mut height) };
        if status < 0 {
            return Err(Error::from_status(status));
        }
        Ok((width, height))
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
