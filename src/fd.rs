//! Raw file descriptor ownership and the non-blocking/reuse-address socket
//! options every handler in the reactor depends on.
//!
//! Grounded on `io/tcp_listener_socket.hpp` in the original source, which
//! performs the equivalent `fcntl(O_NONBLOCK)` / `setsockopt(SO_REUSEADDR)`
//! dance on a raw `int` socket before handing it to the poller.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Owns exactly one OS descriptor. Close is idempotent: a second `close()`
/// on an already-closed descriptor is a no-op `Ok(())`, and `Drop` silently
/// swallows any close error (there is no one left to report it to).
#[derive(Debug)]
pub struct FileDescriptor {
  fd: RawFd,
  open: bool,
}

impl FileDescriptor {
  pub fn new(fd: RawFd) -> Self {
    Self { fd, open: true }
  }

  pub fn raw(&self) -> RawFd {
    self.fd
  }

  pub fn is_open(&self) -> bool {
    self.open
  }

  /// Hands raw ownership of the descriptor to the caller without closing
  /// it; used when wrapping an accepted socket in a `std::net::TcpStream`,
  /// which takes over close-on-drop itself.
  pub fn into_raw(mut self) -> RawFd {
    self.open = false;
    self.fd
  }

  /// Idempotent: closing an already-closed descriptor is a no-op.
  pub fn close(&mut self) -> io::Result<()> {
    if !self.open {
      return Ok(());
    }
    self.open = false;
    // SAFETY: `self.fd` is owned by this struct and not yet closed (checked
    // above); after this call `self.open` is false so it is never closed
    // twice.
    let res = unsafe { libc::close(self.fd) };
    if res != 0 {
      return Err(io::Error::last_os_error());
    }
    Ok(())
  }

  pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
    // SAFETY: `self.fd` is a valid open descriptor for the lifetime of
    // this call.
    unsafe {
      let flags = libc::fcntl(self.fd, libc::F_GETFL, 0);
      if flags < 0 {
        return Err(io::Error::last_os_error());
      }
      let flags =
        if nonblocking { flags | libc::O_NONBLOCK } else { flags & !libc::O_NONBLOCK };
      if libc::fcntl(self.fd, libc::F_SETFL, flags) < 0 {
        return Err(io::Error::last_os_error());
      }
    }
    Ok(())
  }

  pub fn set_reuseaddr(&self, enable: bool) -> io::Result<()> {
    let value: libc::c_int = if enable { 1 } else { 0 };
    // SAFETY: `value` outlives the call and its size matches what we tell
    // setsockopt to read.
    let res = unsafe {
      libc::setsockopt(
        self.fd,
        libc::SOL_SOCKET,
        libc::SO_REUSEADDR,
        &value as *const libc::c_int as *const libc::c_void,
        std::mem::size_of::<libc::c_int>() as libc::socklen_t,
      )
    };
    if res != 0 {
      return Err(io::Error::last_os_error());
    }
    Ok(())
  }
}

impl Drop for FileDescriptor {
  fn drop(&mut self) {
    let _ = self.close();
  }
}

/// Adopt the descriptor owned by a standard-library socket type without
/// taking it away from that value (used where the reactor wants to apply
/// socket options ahead of wrapping the socket in a `Stream`).
pub fn borrow_raw(sock: &impl AsRawFd) -> RawFd {
  sock.as_raw_fd()
}

/// Sets `O_NONBLOCK` on a descriptor this crate does not own (stdin/stdout
/// plumbed into the reactor by the interactive client demo), without
/// wrapping it in a `FileDescriptor` that would close it on drop.
pub fn set_nonblocking_raw(fd: RawFd, nonblocking: bool) -> io::Result<()> {
  // SAFETY: `fd` is a valid descriptor for the duration of this call; it is
  // not closed or otherwise invalidated here.
  unsafe {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
      return Err(io::Error::last_os_error());
    }
    let flags = if nonblocking { flags | libc::O_NONBLOCK } else { flags & !libc::O_NONBLOCK };
    if libc::fcntl(fd, libc::F_SETFL, flags) < 0 {
      return Err(io::Error::last_os_error());
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::TcpListener;

  #[test]
  fn close_is_idempotent() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let raw = listener.as_raw_fd();
    // Duplicate so closing our FileDescriptor doesn't fight the TcpListener's
    // own Drop impl over the same fd.
    let dup = unsafe { libc::dup(raw) };
    assert!(dup >= 0);
    let mut owned = FileDescriptor::new(dup);
    assert!(owned.is_open());
    owned.close().expect("first close succeeds");
    assert!(!owned.is_open());
    owned.close().expect("second close is a no-op");
  }

  #[test]
  fn nonblocking_toggle_roundtrips() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let dup = unsafe { libc::dup(listener.as_raw_fd()) };
    let owned = FileDescriptor::new(dup);
    owned.set_nonblocking(true).expect("set nonblocking");
    owned.set_nonblocking(false).expect("unset nonblocking");
  }
}
