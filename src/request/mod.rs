//! Requests: one-shot engine operations that complete once and carry no
//! persistent state of their own, as opposed to the handles in
//! [`crate::handle`].
//!
//! Not every request lives here -- `connect`, `write`, `shutdown`, and UDP
//! `send` are one-shot too, but they only ever make sense against a
//! specific handle, so they're implemented alongside the handle that owns
//! them ([`crate::handle::tcp::Tcp::connect`], [`crate::io::output::write`],
//! [`crate::handle::stream::shutdown`], [`crate::handle::udp::Udp::send`]).
//! What's collected here are the requests that stand on their own: a path,
//! a descriptor, a hostname, or a closure, rather than a handle.

pub mod dns;
pub mod fs;
pub mod work;
