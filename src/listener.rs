//! The bound, listening TCP endpoint. Grounded on `io/tcp_listener_socket.hpp`
//! and `io/tcp_listener_poll_handler.hpp` in the original source: create a
//! stream socket, enable address reuse, bind, listen, and hand back accepted
//! descriptors already in non-blocking mode.

use crate::endpoint::PeerEndpoint;
use crate::error::{ReactorError, ReactorResult};
use crate::fd::FileDescriptor;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, ToSocketAddrs};
use std::os::unix::io::RawFd;

const DEFAULT_BACKLOG: i32 = 10;

fn resolve_ipv4(host: &str, port: u16) -> ReactorResult<SocketAddrV4> {
  (host, port)
    .to_socket_addrs()
    .map_err(|e| ReactorError::Resolve(format!("{host}:{port}: {e}")))?
    .find_map(|addr| match addr {
      std::net::SocketAddr::V4(v4) => Some(v4),
      std::net::SocketAddr::V6(_) => None,
    })
    .ok_or_else(|| ReactorError::Resolve(format!("{host} has no IPv4 address")))
}

fn to_sockaddr_in(addr: SocketAddrV4) -> libc::sockaddr_in {
  libc::sockaddr_in {
    sin_family: libc::AF_INET as libc::sa_family_t,
    sin_port: addr.port().to_be(),
    sin_addr: libc::in_addr { s_addr: u32::from_ne_bytes(addr.ip().octets()) },
    sin_zero: [0; 8],
  }
}

/// A bound, listening IPv4 TCP socket.
#[derive(Debug)]
pub struct Listener {
  fd: FileDescriptor,
  local_port: u16,
}

impl Listener {
  pub fn bind(host: &str, port: u16) -> ReactorResult<Self> {
    Self::bind_with_backlog(host, port, DEFAULT_BACKLOG)
  }

  pub fn bind_with_backlog(host: &str, port: u16, backlog: i32) -> ReactorResult<Self> {
    let addr = resolve_ipv4(host, port)?;

    // SAFETY: a fresh IPv4/SOCK_STREAM socket; the returned fd is checked
    // for failure (-1) before being wrapped.
    let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if raw < 0 {
      return Err(io::Error::last_os_error().into());
    }
    let fd = FileDescriptor::new(raw);
    fd.set_reuseaddr(true)?;

    let sockaddr = to_sockaddr_in(addr);
    // SAFETY: `sockaddr` is a valid, correctly sized sockaddr_in for the
    // duration of the call.
    let res = unsafe {
      libc::bind(
        fd.raw(),
        &sockaddr as *const libc::sockaddr_in as *const libc::sockaddr,
        std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
      )
    };
    if res != 0 {
      return Err(io::Error::last_os_error().into());
    }

    // SAFETY: `fd.raw()` is the just-bound socket.
    let res = unsafe { libc::listen(fd.raw(), backlog) };
    if res != 0 {
      return Err(io::Error::last_os_error().into());
    }

    fd.set_nonblocking(true)?;

    let local_port = if addr.port() == 0 { query_local_port(&fd)? } else { addr.port() };

    Ok(Self { fd, local_port })
  }

  /// Accepts one pending connection, or returns `None` if none is pending
  /// (the non-blocking equivalent of `WouldBlock`).
  pub fn accept(&self) -> ReactorResult<Option<(FileDescriptor, PeerEndpoint)>> {
    // SAFETY: `storage`/`len` are sized for an IPv4 sockaddr and fully
    // initialized (zeroed) before `accept` writes into them.
    let (accepted, storage) = unsafe {
      let mut storage: libc::sockaddr_in = std::mem::zeroed();
      let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
      let accepted =
        libc::accept(self.fd.raw(), &mut storage as *mut libc::sockaddr_in as *mut libc::sockaddr, &mut len);
      (accepted, storage)
    };

    if accepted < 0 {
      let err = io::Error::last_os_error();
      if err.kind() == io::ErrorKind::WouldBlock {
        return Ok(None);
      }
      return Err(err.into());
    }

    let fd = FileDescriptor::new(accepted);
    fd.set_nonblocking(true)?;

    let ip = Ipv4Addr::from(u32::from_be(storage.sin_addr.s_addr));
    let port = u16::from_be(storage.sin_port);
    Ok(Some((fd, PeerEndpoint::new(ip.to_string(), port))))
  }

  pub fn raw_fd(&self) -> RawFd {
    self.fd.raw()
  }

  pub fn local_port(&self) -> u16 {
    self.local_port
  }

  pub fn close(&mut self) -> io::Result<()> {
    self.fd.close()
  }
}

fn query_local_port(fd: &FileDescriptor) -> ReactorResult<u16> {
  // SAFETY: `storage`/`len` are sized for an IPv4 sockaddr and fully
  // initialized before `getsockname` writes into them.
  let storage = unsafe {
    let mut storage: libc::sockaddr_in = std::mem::zeroed();
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    if libc::getsockname(fd.raw(), &mut storage as *mut libc::sockaddr_in as *mut libc::sockaddr, &mut len) != 0 {
      return Err(io::Error::last_os_error().into());
    }
    storage
  };
  Ok(u16::from_be(storage.sin_port))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bind_to_ephemeral_port_resolves_a_real_port() {
    let listener = Listener::bind("127.0.0.1", 0).expect("bind");
    assert_ne!(listener.local_port(), 0);
  }

  #[test]
  fn accept_on_idle_listener_is_would_block() {
    let listener = Listener::bind("127.0.0.1", 0).expect("bind");
    let result = listener.accept().expect("accept does not fault");
    assert!(result.is_none());
  }

  #[test]
  fn accept_returns_peer_after_connect() {
    let listener = Listener::bind("127.0.0.1", 0).expect("bind");
    let port = listener.local_port();
    let _client = std::net::TcpStream::connect(("127.0.0.1", port)).expect("connect");
    // The kernel may need a moment to surface the pending connection; a
    // unit test keeps this simple by retrying a handful of times instead of
    // pulling in a timer dependency.
    for _ in 0..1000 {
      if let Some((_fd, peer)) = listener.accept().expect("accept") {
        assert_eq!(peer.host, "127.0.0.1");
        return;
      }
    }
    panic!("listener never reported the pending connection");
  }
}
