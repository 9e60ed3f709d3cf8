//! file pseudo-handle
//!
//! `uv_fs_t` carries no persistent state the way a socket or pipe does --
//! there's no "open file" concept in the engine beyond a file descriptor --
//! so a continuous read here is emulated by resubmitting
//! [`crate::request::fs::read`] from its own completion, at the file's
//! current position, for as long as the caller hasn't stopped it.

use std::cell::{Cell, RefCell};
use std::os::raw::c_int;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::reactor::Loop;
use crate::request::fs;

type OnReadFn = Box<dyn FnMut(Result<Buffer>)>;

struct ReadState {
    callback: OnReadFn,
    running: bool,
}

/// An open file descriptor bound to a loop, read/written through the
/// threadpool rather than the loop's I/O poller.
#[derive(Clone)]
pub struct File {
    loop_: Loop,
    fd: Rc<Cell<c_int>>,
    read: Rc<RefCell<Option<Rc<RefCell<ReadState>>>>>,
    write_queue_size: Rc<Cell<usize>>,
}

impl File {
    /// Open (and possibly create) a file, yielding it once the open
    /// completes.
    pub fn open(
        loop_: &Loop,
        path: &str,
        flags: c_int,
        mode: c_int,
        cb: impl FnOnce(Result<File>) + 'static,
    ) -> Result<()> {
        let loop_for_result = loop_.clone();
        fs::open(loop_, path, flags, mode, move |result| {
            cb(result.map(|fd| File::from_fd(&loop_for_result, fd)))
        })
        .map(|_req| ())
    }

    /// Wrap an already-open descriptor (e.g. an inherited stdin/stdout),
    /// without performing an `open` of its own.
    pub fn from_fd(loop_: &Loop, fd: c_int) -> Self {
        Self {
            loop_: loop_.clone(),
            fd: Rc::new(Cell::new(fd)),
            read: Rc::new(RefCell::new(None)),
            write_queue_size: Rc::new(Cell::new(0)),
        }
    }

    pub fn fd(&self) -> c_int {
        self.fd.get()
    }

    /// Bytes submitted for writing whose completion hasn't yet run --
    /// files have no native write queue, so this is tracked by hand.
    pub fn write_queue_size(&self) -> usize {
        self.write_queue_size.get()
    }

    /// Read at `offset` (`-1` for the file's current position), once.
    pub fn read(
        &self,
        buffer: Buffer,
        offset: i64,
        cb: impl FnOnce(Result<Buffer>) + 'static,
    ) -> Result<()> {
        fs::read(&self.loop_, self.fd.get(), buffer, offset, cb).map(|_req| ())
    }

    pub fn write(
        &self,
        buffer: Buffer,
        offset: i64,
        cb: impl FnOnce(Result<usize>) + 'static,
    ) -> Result<()> {
        let pending = buffer.total_len();
        self.write_queue_size.set(self.write_queue_size.get() + pending);
        let wqs = self.write_queue_size.clone();
        fs::write(&self.loop_, self.fd.get(), buffer, offset, move |result| {
            wqs.set(wqs.get() - pending);
            cb(result)
        })
        .map(|_req| ())
    }

    /// Start reading continuously from the file's current position,
    /// delivering each chunk to `cb` until end-of-file, an error, or
    /// [`File::read_stop`].
    pub fn read_start(&self, cb: impl FnMut(Result<Buffer>) + 'static) -> Result<()> {
        let state = Rc::new(RefCell::new(ReadState { callback: Box::new(cb), running: true }));
        *self.read.borrow_mut() = Some(state.clone());
        self.pump(state)
    }

    /// Stop continuous reads. The registered callback is retained, so a
    /// later [`File::read_resume`] picks up where it left off.
    pub fn read_stop(&self) {
        if let Some(state) = self.read.borrow().as_ref() {
            state.borrow_mut().running = false;
        }
    }

    /// Stop the continuous read when `condition` holds; a no-op otherwise.
    pub fn read_pause(&self, condition: bool) {
        if condition {
            self.read_stop();
        }
    }

    /// Resume a continuous read that was paused, when `condition` holds.
    /// A no-op otherwise, and also a no-op if no read was ever started.
    pub fn read_resume(&self, condition: bool) -> Result<()> {
        if !condition {
            return Ok(());
        }
        let existing = self.read.borrow().clone();
        if let Some(state) = existing {
            let already_running = state.borrow().running;
            if !already_running {
                state.borrow_mut().running = true;
                return self.pump(state);
            }
        }
        Ok(())
    }

    fn pump(&self, state: Rc<RefCell<ReadState>>) -> Result<()> {
        let buffer = Buffer::with_capacity(64 * 1024);
        let this = self.clone();
        let state_for_cb = state.clone();
        fs::read(&self.loop_, self.fd.get(), buffer, -1, move |result| {
            if !state_for_cb.borrow().running {
                return;
            }
            match result {
                Ok(buf) if buf.len(0) == 0 => {
                    let mut st = state_for_cb.borrow_mut();
                    st.running = false;
                    (st.callback)(Err(Error::EndOfStream));
                }
                Ok(buf) => {
                    (state_for_cb.borrow_mut().callback)(Ok(buf));
                    if state_for_cb.borrow().running {
                        let _ = this.pump(state_for_cb.clone());
                    }
                }
                Err(e) => {
                    let mut st = state_for_cb.borrow_mut();
                    st.running = false;
                    (st.callback)(Err(e));
                }
            }
        })
        .map(|_req| ())
    }

    /// Close the descriptor, invoking `cb` once the close completes.
    pub fn close(&self, cb: impl FnOnce(Result<()>) + 'static) -> Result<()> {
        self.read_stop();
        fs::close(&self.loop_, self.fd.get(), cb).map(|_req| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fd_exposes_the_descriptor() {
        let loop_ = Loop::new().unwrap();
        let f = File::from_fd(&loop_, 7);
        assert_eq!(f.fd(), 7);
    }
}
