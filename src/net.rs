//! net
//!
//! Socket address construction and host/network byte order conversion,
//! mirroring libuv's own `uv_ip4_addr`/`uv_ip6_addr` helpers plus the
//! portable byte-swap routines every wire-format handler needs.

use std::ffi::CString;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::error::{Error, Result};

/// Build a `sockaddr_in` for `addr`, the way `uv_ip4_addr` does.
pub fn ip4_addr(addr: &SocketAddrV4) -> Result<libuv_sys2::sockaddr_in> {
    let mut sa: libuv_sys2::sockaddr_in = unsafe { mem::zeroed() };
    let host = CString::new(addr.ip().to_string()).expect("address string has no interior NUL");
    let status = unsafe { libuv_sys2::uv_ip4_addr(host.as_ptr(), addr.port() as i32, &mut sa) };
    if status < 0 {
        return Err(Error::from_status(status));
    }
    Ok(sa)
}

/// Build a `sockaddr_in6` for `addr`, the way `uv_ip6_addr` does.
pub fn ip6_addr(addr: &SocketAddrV6) -> Result<libuv_sys2::sockaddr_in6> {
    let mut sa: libuv_sys2::sockaddr_in6 = unsafe { mem::zeroed() };
    let host = CString::new(addr.ip().to_string()).expect("address string has no interior NUL");
    let status = unsafe { libuv_sys2::uv_ip6_addr(host.as_ptr(), addr.port() as i32, &mut sa) };
    if status < 0 {
        return Err(Error::from_status(status));
    }
    Ok(sa)
}

/// Render a `SocketAddr` as the matching engine sockaddr storage, tagged
/// with its length so callers can pass the right size to `connect`/`bind`.
pub enum RawSockAddr {
    V4(libuv_sys2::sockaddr_in),
    V6(libuv_sys2::sockaddr_in6),
}

impl RawSockAddr {
    pub fn from_socket_addr(addr: &SocketAddr) -> Result<Self> {
        match addr {
            SocketAddr::V4(a) => Ok(RawSockAddr::V4(ip4_addr(a)?)),
            SocketAddr::V6(a) => Ok(RawSockAddr::V6(ip6_addr(a)?)),
        }
    }

    pub fn as_ptr(&self) -> *const libuv_sys2::sockaddr {
        match self {
            RawSockAddr::V4(sa) => sa as *const _ as *const libuv_sys2::sockaddr,
            RawSockAddr::V6(sa) => sa as *const _ as *const libuv_sys2::sockaddr,
        }
    }
}

/// Recover a `SocketAddr` from a raw `sockaddr_storage` as filled in by,
/// e.g., `uv_tcp_getsockname`.
pub fn socket_addr_from_storage(storage: &libuv_sys2::sockaddr_storage) -> Result<SocketAddr> {
    let family = storage.ss_family as i32;
    if family == libuv_sys2::AF_INET as i32 {
        let sa: libuv_sys2::sockaddr_in =
            unsafe { *(storage as *const _ as *const libuv_sys2::sockaddr_in) };
        let port = ntoh16(sa.sin_port);
        let ip = Ipv4Addr::from(ntoh32(unsafe { sa.sin_addr.s_addr }));
        Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
    } else if family == libuv_sys2::AF_INET6 as i32 {
        let sa: libuv_sys2::sockaddr_in6 =
            unsafe { *(storage as *const _ as *const libuv_sys2::sockaddr_in6) };
        let port = ntoh16(sa.sin6_port);
        let octets: [u8; 16] = unsafe {
            std::ptr::read_unaligned(&sa.sin6_addr as *const _ as *const [u8; 16])
        };
        let ip = Ipv6Addr::from(octets);
        Ok(SocketAddr::V6(SocketAddrV6::new(ip, port, sa.sin6_flowinfo, sa.sin6_scope_id)))
    } else {
        Err(Error::Invalid)
    }
}

/// Host-to-network byte order, 16-bit.
pub fn hton16(value: u16) -> u16 {
    value.to_be()
}

/// Host-to-network byte order, 32-bit.
pub fn hton32(value: u32) -> u32 {
    value.to_be()
}

/// Host-to-network byte order, 64-bit. On a little-endian host this is
/// equivalent to swapping the two 32-bit halves and byte-swapping each
/// (matching the original library's portable fallback for platforms
/// without a native 64-bit byte-swap intrinsic).
pub fn hton64(value: u64) -> u64 {
    value.to_be()
}

/// Network-to-host byte order, 16-bit.
pub fn ntoh16(value: u16) -> u16 {
    u16::from_be(value)
}

/// Network-to-host byte order, 32-bit.
pub fn ntoh32(value: u32) -> u32 {
    u32::from_be(value)
}

/// Network-to-host byte order, 64-bit.
pub fn ntoh64(value: u64) -> u64 {
    u64::from_be(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_round_trips() {
        assert_eq!(ntoh16(hton16(0x1234)), 0x1234);
        assert_eq!(ntoh32(hton32(0xdead_beef)), 0xdead_beef);
        assert_eq!(ntoh64(hton64(0x0123_4567_89ab_cdef)), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn hton16_matches_known_value() {
        // 0x1234 in network (big-endian) byte order is the bytes [0x12, 0x34].
        assert_eq!(hton16(0x1234).to_ne_bytes(), [0x12, 0x34]);
    }
}
