//! error

use std::{error, ffi::CStr, fmt, io};

/// Error kinds surfaced by the core.
///
/// `Ok` has no variant here: every fallible engine call returns
/// `Result<T, Error>`, so success is simply `Ok(value)`.
#[derive(Debug)]
pub enum Error {
    /// A read observed end-of-stream. Distinguished from a negative engine
    /// status so callers don't have to remember the magic constant.
    EndOfStream,
    /// Preconditions were not met (e.g. empty callbacks passed to
    /// `read_start` with no previously registered callback).
    Invalid,
    /// A non-blocking attempt (`try_write`/`try_send`) could not complete
    /// immediately.
    WouldBlock,
    /// The request was cancelled before or during execution.
    Cancelled,
    /// The operation does not apply to this handle's variant.
    BadHandle,
    /// An opaque pass-through of a negative libuv status code.
    Engine(i32),
    /// A reference count was incremented from zero. Reserved for
    /// `Display`/`Debug` purposes only -- the actual failure mode
    /// (`RefCount::inc`) panics rather than returning this.
    Resurrection,
}

impl Error {
    /// Wrap a raw libuv status code, classifying the well-known ones.
    pub fn from_status(status: i32) -> Self {
        match status {
            s if s == libuv_sys2::UV_EOF as i32 => Error::EndOfStream,
            s if s == libuv_sys2::UV_ECANCELED as i32 => Error::Cancelled,
            s if s == libuv_sys2::UV_EAGAIN as i32 => Error::WouldBlock,
            s => Error::Engine(s),
        }
    }

    /// `true` for any status that represents success (`status >= 0`), the
    /// boolean conversion every engine call result uses.
    pub fn is_ok_status(status: i32) -> bool {
        status >= 0
    }

    fn engine_message(code: i32) -> String {
        // SAFETY: uv_strerror returns a pointer to a static, NUL terminated
        // string owned by libuv; it is never freed and is valid for the
        // program's lifetime.
        unsafe {
            let ptr = libuv_sys2::uv_strerror(code);
            if ptr.is_null() {
                format!("unknown engine error {code}")
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EndOfStream => write!(f, "end of stream"),
            Error::Invalid => write!(f, "invalid argument"),
            Error::WouldBlock => write!(f, "operation would block"),
            Error::Cancelled => write!(f, "request cancelled"),
            Error::BadHandle => write!(f, "operation does not apply to this handle variant"),
            Error::Engine(code) => write!(f, "{} ({code})", Self::engine_message(*code)),
            Error::Resurrection => write!(f, "attempt to resurrect a reference from a count of zero"),
        }
    }
}

impl error::Error for Error {}

impl From<i32> for Error {
    fn from(status: i32) -> Self {
        Error::from_status(status)
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::EndOfStream => io::Error::new(io::ErrorKind::UnexpectedEof, value.to_string()),
            Error::WouldBlock => io::Error::new(io::ErrorKind::WouldBlock, value.to_string()),
            Error::Invalid => io::Error::new(io::ErrorKind::InvalidInput, value.to_string()),
            other => io::Error::other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
