//! Per-connection I/O adapter. Plain and TLS variants share the same
//! drain/progress outcome shape so the `Handler` in `handler.rs` never
//! branches on TLS-ness directly (see `DESIGN.md`'s design notes).

pub mod plain;
#[cfg(feature = "tls")]
pub mod tls;

pub use plain::PlainStream;
#[cfg(feature = "tls")]
pub use tls::TlsStream;

use crate::error::ReactorResult;

/// Outcome of one read attempt on a stream.
#[derive(Debug)]
pub enum ReadStatus {
  Data(usize),
  WouldBlock,
  OrderlyClose,
}

/// Outcome of one write attempt on a stream.
#[derive(Debug)]
pub enum WriteStatus {
  Wrote(usize),
  WouldBlock,
  OrderlyClose,
}

/// Either a plain or TLS-layered byte stream. An enum rather than a trait
/// object: the set of variants is closed and small, and concrete dispatch
/// keeps every stream operation a direct, inlinable match.
#[derive(Debug)]
pub enum Stream {
  Plain(PlainStream),
  #[cfg(feature = "tls")]
  Tls(Box<TlsStream>),
}

impl Stream {
  pub fn read_once(&mut self, buf: &mut [u8]) -> ReactorResult<ReadStatus> {
    match self {
      Stream::Plain(s) => s.read_once(buf),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => s.read_once(buf),
    }
  }

  pub fn write_once(&mut self, buf: &[u8]) -> ReactorResult<WriteStatus> {
    match self {
      Stream::Plain(s) => s.write_once(buf),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => s.write_once(buf),
    }
  }

  /// Protocol-level read want, distinct from application intent. Always
  /// `false` for a plain stream.
  pub fn wants_read(&self) -> bool {
    match self {
      Stream::Plain(_) => false,
      #[cfg(feature = "tls")]
      Stream::Tls(s) => s.wants_read(),
    }
  }

  /// Protocol-level write want, distinct from application intent. Always
  /// `false` for a plain stream.
  pub fn wants_write(&self) -> bool {
    match self {
      Stream::Plain(_) => false,
      #[cfg(feature = "tls")]
      Stream::Tls(s) => s.wants_write(),
    }
  }

  pub fn is_open(&self) -> bool {
    match self {
      Stream::Plain(s) => s.is_open(),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => s.is_open(),
    }
  }

  pub fn request_close(&mut self) {
    match self {
      Stream::Plain(s) => s.request_close(),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => s.request_close(),
    }
  }

  pub fn peer_addr(&self) -> String {
    match self {
      Stream::Plain(s) => s.peer_addr(),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => s.peer_addr(),
    }
  }

  pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
    match self {
      Stream::Plain(s) => s.raw_fd(),
      #[cfg(feature = "tls")]
      Stream::Tls(s) => s.raw_fd(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fd::FileDescriptor;
  use std::net::{TcpListener, TcpStream};
  use std::os::unix::io::IntoRawFd;

  #[test]
  fn plain_stream_reports_no_protocol_level_wants() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let _client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    server.set_nonblocking(true).expect("nonblocking");
    let stream = Stream::Plain(PlainStream::from_fd(FileDescriptor::new(server.into_raw_fd())));
    assert!(!stream.wants_read());
    assert!(!stream.wants_write());
    assert!(stream.is_open());
  }
}
