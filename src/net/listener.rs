//! Listening socket setup.
//!
//! # Responsibilities
//! - Create a non-blocking, close-on-exec IPv4 TCP socket
//! - Apply SO_REUSEADDR, and SO_REUSEPORT / TCP_NODELAY when asked
//! - Bind to `0.0.0.0:port` and listen with the platform's maximum backlog
//! - Optionally delay accept until the client sends data (TCP_DEFER_ACCEPT)
//!
//! Any failure drops the half-built socket, which closes it.

use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::AsRawFd;

use socket2::{Domain, Protocol, Socket, Type};

use crate::status::{LbError, LbResult};

/// Bind a listening socket on all IPv4 interfaces.
pub fn bind_listen(port: u16, reuseport: bool, nodelay: bool) -> LbResult<Socket> {
    // socket2 sets close-on-exec at creation.
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| LbError::system("socket", e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| LbError::system("set_nonblocking", e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| LbError::system("SO_REUSEADDR", e))?;
    if reuseport {
        socket
            .set_reuse_port(true)
            .map_err(|e| LbError::system("SO_REUSEPORT", e))?;
    }
    if nodelay {
        socket
            .set_nodelay(true)
            .map_err(|e| LbError::system("TCP_NODELAY", e))?;
    }

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket
        .bind(&addr.into())
        .map_err(|e| LbError::system("bind", e))?;
    socket
        .listen(libc::SOMAXCONN)
        .map_err(|e| LbError::system("listen", e))?;

    tracing::debug!(
        target: "net",
        port,
        reuseport,
        nodelay,
        backlog = libc::SOMAXCONN,
        "Listening socket bound"
    );
    Ok(socket)
}

/// Have the kernel hold connections until data arrives or `secs` elapse.
pub fn set_defer_accept(socket: &Socket, secs: u32) -> LbResult<()> {
    let optval = libc::c_int::try_from(secs).unwrap_or(libc::c_int::MAX);
    // SAFETY: the fd is open for the lifetime of `socket`, and optval is a
    // c_int whose size is passed alongside it.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_DEFER_ACCEPT,
            &optval as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(LbError::last_os("TCP_DEFER_ACCEPT"));
    }
    Ok(())
}

/// Bound address of a listening socket, if it is IPv4.
pub fn local_addr_v4(socket: &Socket) -> LbResult<SocketAddrV4> {
    socket
        .local_addr()
        .map_err(|e| LbError::system("getsockname", e))?
        .as_socket_ipv4()
        .ok_or(LbError::InvalidState("listener is not IPv4"))
}
