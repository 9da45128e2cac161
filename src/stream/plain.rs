//! The non-TLS `ByteStream`. Grounded on the `TlsCapableStream` impl for
//! `TcpStream` in the teacher's `tls_stream.rs` (plain `Read`/`Write` over a
//! non-blocking socket) generalized to the drain/progress outcome taxonomy
//! in `io/tcp_stream.hpp` in the original source (the plain, pre-TLS stage).

use crate::error::ReactorResult;
use crate::fd::FileDescriptor;
use crate::stream::{ReadStatus, WriteStatus};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

#[derive(Debug)]
pub struct PlainStream {
  inner: TcpStream,
  open: bool,
}

impl PlainStream {
  pub fn from_fd(fd: FileDescriptor) -> Self {
    // SAFETY: `fd` owns a valid, non-blocking, connected socket; ownership
    // moves into the `TcpStream`, which takes over close-on-drop.
    let inner = unsafe { TcpStream::from_raw_fd(fd.into_raw()) };
    Self { inner, open: true }
  }

  pub fn read_once(&mut self, buf: &mut [u8]) -> ReactorResult<ReadStatus> {
    match self.inner.read(buf) {
      Ok(0) => {
        self.open = false;
        Ok(ReadStatus::OrderlyClose)
      }
      Ok(n) => Ok(ReadStatus::Data(n)),
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadStatus::WouldBlock),
      Err(e) => {
        self.open = false;
        Err(e.into())
      }
    }
  }

  pub fn write_once(&mut self, buf: &[u8]) -> ReactorResult<WriteStatus> {
    if buf.is_empty() {
      return Ok(WriteStatus::Wrote(0));
    }
    match self.inner.write(buf) {
      Ok(0) => {
        self.open = false;
        Ok(WriteStatus::OrderlyClose)
      }
      Ok(n) => Ok(WriteStatus::Wrote(n)),
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(WriteStatus::WouldBlock),
      Err(e) => {
        self.open = false;
        Err(e.into())
      }
    }
  }

  pub fn is_open(&self) -> bool {
    self.open
  }

  pub fn request_close(&mut self) {
    self.open = false;
    let _ = self.inner.shutdown(std::net::Shutdown::Both);
  }

  pub fn peer_addr(&self) -> String {
    self.inner.peer_addr().map(|a| a.to_string()).unwrap_or_default()
  }

  pub fn raw_fd(&self) -> RawFd {
    self.inner.as_raw_fd()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fd::FileDescriptor;
  use std::net::TcpListener;
  use std::os::unix::io::{AsRawFd, IntoRawFd};

  fn connected_pair() -> (PlainStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    server.set_nonblocking(true).expect("nonblocking");
    let fd = FileDescriptor::new(server.into_raw_fd());
    (PlainStream::from_fd(fd), client)
  }

  #[test]
  fn write_then_read_roundtrips() {
    let (mut server, mut client) = connected_pair();
    client.write_all(b"hello").expect("write");
    // Give the kernel a moment to make the bytes visible non-blocking.
    let mut buf = [0u8; 16];
    let mut got = Vec::new();
    for _ in 0..1000 {
      match server.read_once(&mut buf).expect("read") {
        ReadStatus::Data(n) => {
          got.extend_from_slice(&buf[..n]);
          break;
        }
        ReadStatus::WouldBlock => continue,
        ReadStatus::OrderlyClose => panic!("unexpected close"),
      }
    }
    assert_eq!(got, b"hello");
  }

  #[test]
  fn empty_write_is_a_no_op() {
    let (mut server, _client) = connected_pair();
    let status = server.write_once(&[]).expect("write");
    assert!(matches!(status, WriteStatus::Wrote(0)));
  }

  #[test]
  fn peer_close_is_orderly() {
    let (mut server, client) = connected_pair();
    drop(client);
    let mut buf = [0u8; 16];
    let mut saw_close = false;
    for _ in 0..1000 {
      match server.read_once(&mut buf).expect("read") {
        ReadStatus::WouldBlock => continue,
        ReadStatus::OrderlyClose => {
          saw_close = true;
          break;
        }
        ReadStatus::Data(_) => panic!("unexpected data"),
      }
    }
    assert!(saw_close);
    assert!(!server.is_open());
  }

  #[test]
  fn raw_fd_is_retained_across_construction() {
    let (server, _client) = connected_pair();
    assert!(server.inner.as_raw_fd() >= 0);
  }
}
