//! Raw socket helpers over libc.
//!
//! All sockets are created non-blocking and close-on-exec; the reactor owns
//! every fd produced here.

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

pub(crate) fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Create a non-blocking socket for `addr`'s family.
pub(crate) fn new_socket(addr: SocketAddr, sock_type: libc::c_int) -> io::Result<RawFd> {
    let domain = if addr.is_ipv4() {
        libc::AF_INET
    } else {
        libc::AF_INET6
    };
    let fd = unsafe {
        libc::socket(
            domain,
            sock_type | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

/// Write a `SocketAddr` into a `sockaddr_storage`, returning the length.
pub(crate) fn socket_addr_to_sockaddr(
    addr: SocketAddr,
    storage: &mut libc::sockaddr_storage,
) -> libc::socklen_t {
    unsafe {
        std::ptr::write_bytes(
            storage as *mut _ as *mut u8,
            0,
            std::mem::size_of::<libc::sockaddr_storage>(),
        );
    }
    match addr {
        SocketAddr::V4(v4) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in;
            unsafe {
                (*sa).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sa).sin_port = v4.port().to_be();
                (*sa).sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            }
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
        }
        SocketAddr::V6(v6) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in6;
            unsafe {
                (*sa).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sa).sin6_port = v6.port().to_be();
                (*sa).sin6_flowinfo = v6.flowinfo();
                (*sa).sin6_addr.s6_addr = v6.ip().octets();
                (*sa).sin6_scope_id = v6.scope_id();
            }
            std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t
        }
    }
}

/// Read a `SocketAddr` back out of a `sockaddr_storage`.
pub(crate) fn sockaddr_to_socket_addr(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let sa = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(
                ip,
                u16::from_be(sa.sin_port),
            )))
        }
        libc::AF_INET6 => {
            let sa = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(sa.sin6_addr.s6_addr);
            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                u16::from_be(sa.sin6_port),
                sa.sin6_flowinfo,
                sa.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

fn setsockopt<T>(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: T,
) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const T as *const libc::c_void,
            std::mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn set_reuseaddr(fd: RawFd) -> io::Result<()> {
    setsockopt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1 as libc::c_int)
}

pub(crate) fn set_nodelay(fd: RawFd, enable: bool) -> io::Result<()> {
    setsockopt(
        fd,
        libc::IPPROTO_TCP,
        libc::TCP_NODELAY,
        enable as libc::c_int,
    )
}

pub(crate) fn set_keepalive(fd: RawFd, enable: bool, idle_secs: u32) -> io::Result<()> {
    setsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_KEEPALIVE,
        enable as libc::c_int,
    )?;
    if enable && idle_secs > 0 {
        setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_KEEPIDLE,
            idle_secs as libc::c_int,
        )?;
    }
    Ok(())
}

/// Advisory buffer sizes; failure is ignored by callers that treat these as
/// preferences.
pub(crate) fn set_buffer_sizes(fd: RawFd, send: usize, recv: usize) -> io::Result<()> {
    if send > 0 {
        setsockopt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, send as libc::c_int)?;
    }
    if recv > 0 {
        setsockopt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, recv as libc::c_int)?;
    }
    Ok(())
}

pub(crate) fn set_ttl(fd: RawFd, ipv4: bool, ttl: u32) -> io::Result<()> {
    if ipv4 {
        setsockopt(fd, libc::IPPROTO_IP, libc::IP_TTL, ttl as libc::c_int)
    } else {
        setsockopt(
            fd,
            libc::IPPROTO_IPV6,
            libc::IPV6_UNICAST_HOPS,
            ttl as libc::c_int,
        )
    }
}

pub(crate) fn bind_fd(fd: RawFd, addr: SocketAddr) -> io::Result<()> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = socket_addr_to_sockaddr(addr, &mut storage);
    let ret = unsafe { libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn listen_fd(fd: RawFd, backlog: i32) -> io::Result<()> {
    let ret = unsafe { libc::listen(fd, backlog) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Start a non-blocking connect. `Ok(true)` means the connection completed
/// immediately; `Ok(false)` means it is in progress and the fd will become
/// writable when it resolves.
pub(crate) fn connect_fd(fd: RawFd, addr: SocketAddr) -> io::Result<bool> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = socket_addr_to_sockaddr(addr, &mut storage);
    let ret = unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) };
    if ret == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EINPROGRESS) {
        return Ok(false);
    }
    Err(err)
}

/// Fetch and clear a pending socket error (after an async connect).
pub(crate) fn take_socket_error(fd: RawFd) -> io::Result<()> {
    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    if err != 0 {
        return Err(io::Error::from_raw_os_error(err));
    }
    Ok(())
}

pub(crate) fn local_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockname(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    sockaddr_to_socket_addr(&storage)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown address family"))
}

pub(crate) fn peer_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let ret = unsafe {
        libc::getpeername(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    sockaddr_to_socket_addr(&storage)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown address family"))
}

pub(crate) fn shutdown_write(fd: RawFd) -> io::Result<()> {
    let ret = unsafe { libc::shutdown(fd, libc::SHUT_WR) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
