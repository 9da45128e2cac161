//! The reactor's per-descriptor participant. Grounded on
//! `io/tcp_socket_poll_handler.hpp` (data-carrying handler: read/write
//! queues, want_read/want_write, the trailing zero-length write for TLS
//! shutdown progress) and `io/tcp_listener_poll_handler.hpp` (listener
//! handler: always readable, never writable, no queues) in the original
//! source. The interactive client's stdio plumbing is grounded on the same
//! source's `FilePollHandler`.

use crate::endpoint::PeerEndpoint;
use crate::error::ReactorResult;
use crate::fd::FileDescriptor;
use crate::listener::Listener;
use crate::stream::{ReadStatus, Stream, WriteStatus};
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;

/// Default size of each buffer appended to the inbound queue by one drain
/// iteration, and the cap on a single write syscall's byte count.
pub const DEFAULT_CHUNK_SIZE: usize = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDirection {
  ReadOnly,
  WriteOnly,
}

/// A non-blocking stdio descriptor plumbed through the same reactor as the
/// socket handlers, used by the interactive client demo for stdin/stdout.
/// Reads and writes go through raw `read(2)`/`write(2)` rather than a
/// `std::fs::File` wrapper so the process's stdin/stdout fds are never
/// closed by this handle's `Drop` (they are owned by the process, not by
/// the reactor).
#[derive(Debug)]
pub struct FileHandle {
  fd: RawFd,
  direction: FileDirection,
  open: bool,
  inbound: VecDeque<Vec<u8>>,
  outbound: VecDeque<(Vec<u8>, usize)>,
}

impl FileHandle {
  pub fn new(fd: RawFd, direction: FileDirection) -> Self {
    Self { fd, direction, open: true, inbound: VecDeque::new(), outbound: VecDeque::new() }
  }

  pub fn want_read(&self) -> bool {
    self.direction == FileDirection::ReadOnly && self.open
  }

  pub fn want_write(&self) -> bool {
    self.direction == FileDirection::WriteOnly && self.open && !self.outbound.is_empty()
  }

  pub fn is_open(&self) -> bool {
    self.open
  }

  pub fn raw_fd(&self) -> RawFd {
    self.fd
  }

  pub fn read(&mut self) -> ReactorResult<()> {
    loop {
      let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
      match self.read_once(&mut buf)? {
        ReadStatus::Data(n) => {
          buf.truncate(n);
          self.inbound.push_back(buf);
        }
        ReadStatus::WouldBlock | ReadStatus::OrderlyClose => break,
      }
    }
    Ok(())
  }

  pub fn write(&mut self) -> ReactorResult<()> {
    while let Some((buf, offset)) = self.outbound.front_mut() {
      let end = (*offset + DEFAULT_CHUNK_SIZE).min(buf.len());
      match self.write_once(&buf[*offset..end])? {
        WriteStatus::Wrote(0) => break,
        WriteStatus::Wrote(n) => {
          *offset += n;
          if *offset >= buf.len() {
            self.outbound.pop_front();
          }
        }
        WriteStatus::WouldBlock | WriteStatus::OrderlyClose => break,
      }
    }
    Ok(())
  }

  pub fn enqueue(&mut self, buf: Vec<u8>) {
    if !self.open || buf.is_empty() {
      return;
    }
    self.outbound.push_back((buf, 0));
  }

  pub fn drain_batch(&mut self) -> Vec<Vec<u8>> {
    self.inbound.drain(..).collect()
  }

  pub fn close(&mut self) {
    self.open = false;
  }

  fn read_once(&mut self, buf: &mut [u8]) -> ReactorResult<ReadStatus> {
    // SAFETY: `self.fd` is a valid, non-blocking descriptor for the
    // lifetime of this handle.
    let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n < 0 {
      let err = io::Error::last_os_error();
      if err.kind() == io::ErrorKind::WouldBlock {
        return Ok(ReadStatus::WouldBlock);
      }
      self.open = false;
      return Err(err.into());
    }
    if n == 0 {
      self.open = false;
      return Ok(ReadStatus::OrderlyClose);
    }
    Ok(ReadStatus::Data(n as usize))
  }

  fn write_once(&mut self, buf: &[u8]) -> ReactorResult<WriteStatus> {
    if buf.is_empty() {
      return Ok(WriteStatus::Wrote(0));
    }
    // SAFETY: `self.fd` is a valid, non-blocking descriptor for the
    // lifetime of this handle; `buf` outlives the call.
    let n = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
    if n < 0 {
      let err = io::Error::last_os_error();
      if err.kind() == io::ErrorKind::WouldBlock {
        return Ok(WriteStatus::WouldBlock);
      }
      self.open = false;
      return Err(err.into());
    }
    if n == 0 {
      self.open = false;
      return Ok(WriteStatus::OrderlyClose);
    }
    Ok(WriteStatus::Wrote(n as usize))
  }
}

/// A data-carrying handler: owns a stream plus the inbound/outbound buffer
/// queues the reactor drains and progresses.
#[derive(Debug)]
pub struct DataHandler {
  stream: Stream,
  inbound: VecDeque<Vec<u8>>,
  outbound: VecDeque<(Vec<u8>, usize)>,
  read_chunk: usize,
  write_chunk: usize,
}

impl DataHandler {
  pub fn new(stream: Stream) -> Self {
    Self {
      stream,
      inbound: VecDeque::new(),
      outbound: VecDeque::new(),
      read_chunk: DEFAULT_CHUNK_SIZE,
      write_chunk: DEFAULT_CHUNK_SIZE,
    }
  }

  pub fn want_read(&self) -> bool {
    self.stream.is_open() || self.stream.wants_read()
  }

  pub fn want_write(&self) -> bool {
    self.stream.is_open() && (!self.outbound.is_empty() || self.stream.wants_write())
  }

  pub fn is_open(&self) -> bool {
    self.stream.is_open()
  }

  pub fn peer_addr(&self) -> String {
    self.stream.peer_addr()
  }

  /// Drains the stream until `WouldBlock`/`OrderlyClose`/`Fault`, appending
  /// each successful read to the inbound queue.
  pub fn read(&mut self) -> ReactorResult<()> {
    loop {
      let mut buf = vec![0u8; self.read_chunk];
      match self.stream.read_once(&mut buf)? {
        ReadStatus::Data(n) => {
          buf.truncate(n);
          self.inbound.push_back(buf);
        }
        ReadStatus::WouldBlock | ReadStatus::OrderlyClose => break,
      }
    }
    Ok(())
  }

  /// Progresses the outbound queue until `WouldBlock`/`OrderlyClose`/`Fault`.
  /// If the queue empties but the stream still wants to write (TLS
  /// handshake/shutdown progress), one zero-length write is attempted so
  /// the engine can flush pending protocol bytes.
  pub fn write(&mut self) -> ReactorResult<()> {
    loop {
      let Some((buf, offset)) = self.outbound.front_mut() else {
        if self.stream.wants_write() {
          self.stream.write_once(&[])?;
        }
        break;
      };
      let end = (*offset + self.write_chunk).min(buf.len());
      match self.stream.write_once(&buf[*offset..end])? {
        WriteStatus::Wrote(0) => break,
        WriteStatus::Wrote(n) => {
          *offset += n;
          if *offset >= buf.len() {
            self.outbound.pop_front();
          }
        }
        WriteStatus::WouldBlock | WriteStatus::OrderlyClose => break,
      }
    }
    Ok(())
  }

  /// Appends bytes to transmit, FIFO relative to other enqueues on this
  /// handler. Silently dropped if the stream is already closed.
  pub fn enqueue(&mut self, buf: Vec<u8>) {
    if !self.stream.is_open() || buf.is_empty() {
      return;
    }
    self.outbound.push_back((buf, 0));
  }

  /// Removes and returns the oldest undelivered inbound buffer.
  pub fn dequeue(&mut self) -> Option<Vec<u8>> {
    self.inbound.pop_front()
  }

  /// Drains every currently-queued inbound buffer, in arrival order, for
  /// one `on_read` batch.
  pub fn drain_batch(&mut self) -> Vec<Vec<u8>> {
    self.inbound.drain(..).collect()
  }

  pub fn close(&mut self) {
    self.stream.request_close();
  }
}

/// One participant in the reactor: either the listening socket or a
/// data-carrying connection (plain/TLS/stdio).
#[derive(Debug)]
pub enum Handler {
  Listener(Listener),
  Data(DataHandler),
  File(FileHandle),
}

impl Handler {
  pub fn want_read(&self) -> bool {
    match self {
      Handler::Listener(_) => true,
      Handler::Data(d) => d.want_read(),
      Handler::File(f) => f.want_read(),
    }
  }

  pub fn want_write(&self) -> bool {
    match self {
      Handler::Listener(_) => false,
      Handler::Data(d) => d.want_write(),
      Handler::File(f) => f.want_write(),
    }
  }

  pub fn is_open(&self) -> bool {
    match self {
      Handler::Listener(_) => true,
      Handler::Data(d) => d.is_open(),
      Handler::File(f) => f.is_open(),
    }
  }

  pub fn raw_fd(&self) -> RawFd {
    match self {
      Handler::Listener(l) => l.raw_fd(),
      Handler::Data(d) => d.raw_fd(),
      Handler::File(f) => f.raw_fd(),
    }
  }

  pub fn is_listener(&self) -> bool {
    matches!(self, Handler::Listener(_))
  }

  /// Drives the read side: drain for data/file handlers, accept loop is
  /// handled separately by the reactor via `accept`.
  pub fn read(&mut self) -> ReactorResult<()> {
    match self {
      Handler::Listener(_) => Ok(()),
      Handler::Data(d) => d.read(),
      Handler::File(f) => f.read(),
    }
  }

  pub fn write(&mut self) -> ReactorResult<()> {
    match self {
      Handler::Listener(_) => Ok(()),
      Handler::Data(d) => d.write(),
      Handler::File(f) => f.write(),
    }
  }

  pub fn enqueue(&mut self, buf: Vec<u8>) {
    match self {
      Handler::Listener(_) => {}
      Handler::Data(d) => d.enqueue(buf),
      Handler::File(f) => f.enqueue(buf),
    }
  }

  pub fn drain_batch(&mut self) -> Vec<Vec<u8>> {
    match self {
      Handler::Listener(_) => Vec::new(),
      Handler::Data(d) => d.drain_batch(),
      Handler::File(f) => f.drain_batch(),
    }
  }

  pub fn close(&mut self) {
    match self {
      Handler::Listener(_) => {}
      Handler::Data(d) => d.close(),
      Handler::File(f) => f.close(),
    }
  }
}

impl DataHandler {
  pub fn raw_fd(&self) -> RawFd {
    self.stream.raw_fd()
  }
}

/// Result of accepting on a listener handler: the new descriptor plus the
/// peer address, ready to be wrapped in a `Stream` and inserted by the
/// reactor.
pub struct Accepted {
  pub fd: FileDescriptor,
  pub peer: PeerEndpoint,
}

impl Handler {
  pub fn accept(&self) -> ReactorResult<Option<Accepted>> {
    match self {
      Handler::Listener(listener) => {
        Ok(listener.accept()?.map(|(fd, peer)| Accepted { fd, peer }))
      }
      _ => Ok(None),
    }
  }
}
