//! Listening endpoint, readiness notification and accept → select path.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};

use lb_core::{Algorithm, BackendState, Core, LbError};

mod common;

use common::small_options;

fn listening_core(defer_accept: bool) -> (Core, u16) {
    let mut core = Core::create_with(0, Algorithm::RoundRobin, small_options(4)).unwrap();
    core.configure().unwrap().defer_accept = defer_accept;
    let addr = core.listen().unwrap();
    assert_eq!(*addr.ip(), Ipv4Addr::UNSPECIFIED);
    (core, addr.port())
}

#[test]
fn accept_returns_none_when_idle() {
    let (core, port) = listening_core(false);
    assert_ne!(port, 0);
    assert_eq!(core.local_addr().unwrap().port(), port);
    assert_eq!(core.wait_readable(0).unwrap(), 0);
    assert!(core.accept().unwrap().is_none());
}

#[test]
fn client_connect_wakes_poller_and_is_accepted() {
    let (core, port) = listening_core(false);
    let client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();

    assert!(core.wait_readable(2000).unwrap() >= 1);
    let (stream, peer) = core.accept().unwrap().expect("pending client");
    assert_eq!(*peer.ip(), Ipv4Addr::LOCALHOST);
    assert_eq!(peer.port(), client.local_addr().unwrap().port());
    assert!(stream.nodelay().unwrap());

    assert!(core.accept().unwrap().is_none());
}

#[test]
fn deferred_accept_wakes_on_data() {
    let (core, port) = listening_core(true);
    let mut client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    client.write_all(b"hello").unwrap();

    assert!(core.wait_readable(2000).unwrap() >= 1);
    assert!(core.accept().unwrap().is_some());
}

#[test]
fn accepted_client_is_dispatched() {
    let (core, port) = listening_core(false);
    for i in 1..=2 {
        let idx = core.add_backend(&format!("10.0.0.{}", i), 80, 1).unwrap();
        core.backend(idx).unwrap().mark(BackendState::Up);
    }

    let _client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    assert!(core.wait_readable(2000).unwrap() >= 1);
    let (_stream, peer) = core.accept().unwrap().unwrap();

    let peer = SocketAddr::V4(peer);
    let backend = core.select_backend(Some(&peer)).unwrap();
    let conn = backend.track();
    assert_eq!(backend.host(), "10.0.0.1");
    assert_eq!(conn.active_conns(), 1);
    drop(conn);
    assert_eq!(backend.active_conns(), 0);
}

#[test]
fn second_listener_on_same_port_needs_reuseport() {
    let mut first = Core::create_with(0, Algorithm::RoundRobin, small_options(4)).unwrap();
    let port = first.listen().unwrap().port();

    // Both sides opt in to SO_REUSEPORT by default.
    let mut shared = Core::create_with(port, Algorithm::LeastConn, small_options(4)).unwrap();
    assert_eq!(shared.listen().unwrap().port(), port);

    let mut exclusive = Core::create_with(port, Algorithm::LeastConn, small_options(4)).unwrap();
    exclusive.configure().unwrap().so_reuseport = false;
    let err = exclusive.listen().unwrap_err();
    assert!(matches!(err, LbError::System { .. }));
    assert_eq!(err.errno(), Some(libc::EADDRINUSE));
    assert!(!exclusive.is_running());
}
