//! The single-threaded, readiness-based event loop. Grounded directly on
//! `io/poller.hpp` in the original source: a `handler_map` keyed by
//! descriptor, a process-wide `sig_atomic_t last_signal_`, `make_poll_fds`
//! (always POLLPRI|POLLERR|POLLHUP|POLLNVAL, plus POLLIN/POLLOUT per
//! handler want), `handle_event`, and `remove_closed_handlers`.

use crate::endpoint::PeerEndpoint;
use crate::error::{ReactorError, ReactorResult};
use crate::handler::{DataHandler, FileDirection, FileHandle, Handler};
use crate::stream::plain::PlainStream;
use crate::stream::Stream;
#[cfg(feature = "tls")]
use crate::stream::tls::TlsStream;
#[cfg(feature = "tls")]
use crate::tls_context::TlsContext;
use crate::{error_log, info_log, warn_log};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, Ordering};
#[cfg(feature = "tls")]
use std::sync::Arc;

static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn record_signal(signum: libc::c_int) {
  LAST_SIGNAL.store(signum, Ordering::Relaxed);
}

/// Installs a minimal `SIGINT` handler: a single relaxed atomic store, no
/// allocation, matching `Poller::handle_signal` in the original source.
pub fn install_sigint_handler() -> io::Result<()> {
  // SAFETY: `action` is fully initialized before being passed to
  // `sigaction`; `record_signal` performs only an atomic store and is
  // therefore async-signal-safe.
  unsafe {
    let mut action: libc::sigaction = std::mem::zeroed();
    action.sa_sigaction = record_signal as usize;
    action.sa_flags = 0;
    libc::sigemptyset(&mut action.sa_mask);
    if libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut()) != 0 {
      return Err(io::Error::last_os_error());
    }
  }
  Ok(())
}

/// The six application hooks from the original `PollClient` interface.
/// Every method has a no-op default so an embedder only implements the
/// ones it cares about.
pub trait ReactorClient {
  fn on_startup(&mut self, _reactor: &mut ReactorHandle<'_>) {}
  fn on_interrupt(&mut self, _reactor: &mut ReactorHandle<'_>) {}
  fn on_open(&mut self, _reactor: &mut ReactorHandle<'_>, _fd: RawFd, _peer: &PeerEndpoint) {}
  fn on_close(&mut self, _reactor: &mut ReactorHandle<'_>, _fd: RawFd) {}
  fn on_read(&mut self, _reactor: &mut ReactorHandle<'_>, _fd: RawFd, _batch: Vec<Vec<u8>>) {}
  fn on_error(&mut self, _reactor: &mut ReactorHandle<'_>, _fd: RawFd, _error: ReactorError) {}
}

/// A narrow view into the reactor passed to callbacks, so a callback can
/// enqueue writes or request a close on any live handler (including its
/// own) without borrowing the whole `Reactor` (which would conflict with
/// the `&mut C` borrow needed to invoke the callback itself).
pub struct ReactorHandle<'a> {
  handlers: &'a mut HashMap<RawFd, Handler>,
  stop_requested: &'a mut bool,
}

impl<'a> ReactorHandle<'a> {
  pub fn write(&mut self, fd: RawFd, buf: Vec<u8>) {
    if let Some(handler) = self.handlers.get_mut(&fd) {
      handler.enqueue(buf);
    }
  }

  /// Idempotent: closing an already-closing or unknown descriptor is a
  /// no-op.
  pub fn close(&mut self, fd: RawFd) {
    if let Some(handler) = self.handlers.get_mut(&fd) {
      handler.close();
    }
  }

  pub fn request_stop(&mut self) {
    *self.stop_requested = true;
  }

  pub fn is_open(&self, fd: RawFd) -> bool {
    self.handlers.get(&fd).map(Handler::is_open).unwrap_or(false)
  }
}

/// The event loop itself. Generic over the embedder's callback
/// implementation so no boxing or dynamic dispatch is needed for the hot
/// path.
pub struct Reactor<C: ReactorClient> {
  handlers: HashMap<RawFd, Handler>,
  #[cfg(feature = "tls")]
  tls_listeners: HashMap<RawFd, Arc<TlsContext>>,
  client: C,
  stop_requested: bool,
  poll_timeout_ms: i32,
}

impl<C: ReactorClient> Reactor<C> {
  pub fn new(client: C) -> Self {
    Self {
      handlers: HashMap::new(),
      #[cfg(feature = "tls")]
      tls_listeners: HashMap::new(),
      client,
      stop_requested: false,
      poll_timeout_ms: 1000,
    }
  }

  pub fn add_listener(&mut self, host: &str, port: u16) -> ReactorResult<RawFd> {
    let listener = crate::listener::Listener::bind(host, port)?;
    let fd = listener.raw_fd();
    self.handlers.insert(fd, Handler::Listener(listener));
    info_log!("reactor: listening on {}:{}", host, port);
    Ok(fd)
  }

  #[cfg(feature = "tls")]
  pub fn add_tls_listener(
    &mut self,
    host: &str,
    port: u16,
    context: Arc<TlsContext>,
  ) -> ReactorResult<RawFd> {
    let fd = self.add_listener(host, port)?;
    self.tls_listeners.insert(fd, context);
    Ok(fd)
  }

  /// Registers an already-connected stream (e.g. the interactive client's
  /// outbound connection) and fires `on_open`.
  pub fn add_connection(&mut self, stream: Stream, peer: PeerEndpoint) -> RawFd {
    let fd = stream.raw_fd();
    self.handlers.insert(fd, Handler::Data(DataHandler::new(stream)));
    self.invoke_guarded(fd, move |client, handle| client.on_open(handle, fd, &peer));
    fd
  }

  pub fn add_file_handler(&mut self, fd: RawFd, direction: FileDirection) -> RawFd {
    self.handlers.insert(fd, Handler::File(FileHandle::new(fd, direction)));
    fd
  }

  pub fn write(&mut self, fd: RawFd, buf: Vec<u8>) {
    if let Some(handler) = self.handlers.get_mut(&fd) {
      handler.enqueue(buf);
    }
  }

  pub fn close(&mut self, fd: RawFd) {
    if let Some(handler) = self.handlers.get_mut(&fd) {
      handler.close();
    }
  }

  pub fn request_stop(&mut self) {
    self.stop_requested = true;
  }

  /// Invokes one of `on_open`/`on_close`/`on_read`/`on_error` for the given
  /// descriptor. A panic from any of these is the embedder's bug and
  /// propagates normally; only `on_interrupt` is required to be swallowed
  /// (spec §7, §4.5 step 3), not these four.
  ///
  /// Takes the client and handle as disjoint field borrows (not via a
  /// `&mut self` helper) so the caller can still reach `self.client`
  /// afterward without fighting the borrow checker.
  fn invoke_guarded<F>(&mut self, _fd: RawFd, call: F)
  where
    F: for<'r> FnOnce(&mut C, &mut ReactorHandle<'r>),
  {
    let client = &mut self.client;
    let mut handle = ReactorHandle { handlers: &mut self.handlers, stop_requested: &mut self.stop_requested };
    call(client, &mut handle);
  }

  pub fn run(&mut self) -> ReactorResult<()> {
    {
      let mut handle =
        ReactorHandle { handlers: &mut self.handlers, stop_requested: &mut self.stop_requested };
      self.client.on_startup(&mut handle);
    }
    while !self.stop_requested {
      self.run_once()?;
    }
    Ok(())
  }

  /// Runs exactly one iteration of the loop. Exposed separately from
  /// `run` so tests can drive the reactor deterministically.
  pub fn run_once(&mut self) -> ReactorResult<()> {
    let mut pollfds: Vec<libc::pollfd> = self
      .handlers
      .iter()
      .map(|(fd, handler)| {
        let mut events = libc::POLLPRI | libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
        if handler.want_read() {
          events |= libc::POLLIN;
        }
        if handler.want_write() {
          events |= libc::POLLOUT;
        }
        libc::pollfd { fd: *fd, events: events as i16, revents: 0 }
      })
      .collect();

    // SAFETY: `pollfds` is a valid, correctly sized buffer owned for the
    // duration of this call.
    let ready =
      unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, self.poll_timeout_ms) };

    if ready < 0 {
      let err = io::Error::last_os_error();
      if err.kind() != io::ErrorKind::Interrupted {
        return Err(err.into());
      }
      // EINTR: treat as zero events ready, fall through to the signal
      // check below.
    }

    let signal = LAST_SIGNAL.swap(0, Ordering::Relaxed);
    if signal != 0 {
      info_log!("reactor: observed signal {}", signal);
      let client = &mut self.client;
      let mut handle =
        ReactorHandle { handlers: &mut self.handlers, stop_requested: &mut self.stop_requested };
      // Spec §7: on_interrupt must not be allowed to unwind out of the
      // event loop, unlike the other five callbacks.
      if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| client.on_interrupt(&mut handle))) {
        error_log!("reactor: on_interrupt panicked: {}", &panic_message(&panic));
      }
    }

    if ready > 0 {
      for pfd in &pollfds {
        if pfd.revents == 0 {
          continue;
        }
        self.dispatch(pfd.fd, pfd.revents as i32);
      }
    }

    self.sweep();
    Ok(())
  }

  fn dispatch(&mut self, fd: RawFd, revents: i32) {
    let is_listener = self.handlers.get(&fd).map(Handler::is_listener).unwrap_or(false);
    if is_listener {
      if revents & libc::POLLIN != 0 {
        self.accept_loop(fd);
      }
      return;
    }

    let readable = revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0;
    let writable = revents & libc::POLLOUT != 0;

    let can_continue = if readable { self.handle_read(fd) } else { true };
    if can_continue && writable {
      self.handle_write(fd);
    }
  }

  fn accept_loop(&mut self, listener_fd: RawFd) {
    loop {
      let accepted = match self.handlers.get(&listener_fd) {
        Some(handler) => handler.accept(),
        None => return,
      };
      let accepted = match accepted {
        Ok(Some(accepted)) => accepted,
        Ok(None) => break,
        Err(e) => {
          warn_log!("reactor: accept failed on fd {}: {}", listener_fd, e);
          break;
        }
      };

      #[cfg(feature = "tls")]
      let stream_result = if let Some(context) = self.tls_listeners.get(&listener_fd) {
        context.new_server_connection().map(|conn| {
          Stream::Tls(Box::new(TlsStream::new_server(accepted.fd, conn, false)))
        })
      } else {
        Ok(Stream::Plain(PlainStream::from_fd(accepted.fd)))
      };
      #[cfg(not(feature = "tls"))]
      let stream_result: ReactorResult<Stream> = Ok(Stream::Plain(PlainStream::from_fd(accepted.fd)));

      let stream = match stream_result {
        Ok(stream) => stream,
        Err(e) => {
          warn_log!("reactor: failed to construct stream for accepted peer {}: {}", accepted.peer, e);
          continue;
        }
      };

      let fd = stream.raw_fd();
      self.handlers.insert(fd, Handler::Data(DataHandler::new(stream)));
      let peer = accepted.peer;
      self.invoke_guarded(fd, move |client, handle| client.on_open(handle, fd, &peer));
    }
  }

  fn handle_read(&mut self, fd: RawFd) -> bool {
    let outcome = self.handlers.get_mut(&fd).map(Handler::read);
    match outcome {
      Some(Ok(())) => {}
      Some(Err(e)) => {
        self.invoke_guarded(fd, move |client, handle| client.on_error(handle, fd, e));
        return false;
      }
      None => return false,
    }

    let batch = self.handlers.get_mut(&fd).map(Handler::drain_batch).unwrap_or_default();
    if !batch.is_empty() {
      self.invoke_guarded(fd, move |client, handle| client.on_read(handle, fd, batch));
    }
    true
  }

  fn handle_write(&mut self, fd: RawFd) {
    let outcome = self.handlers.get_mut(&fd).map(Handler::write);
    if let Some(Err(e)) = outcome {
      self.invoke_guarded(fd, move |client, handle| client.on_error(handle, fd, e));
    }
  }

  fn sweep(&mut self) {
    let closed: Vec<RawFd> =
      self.handlers.iter().filter(|(_, h)| !h.is_open()).map(|(fd, _)| *fd).collect();
    for fd in closed {
      let is_listener = self.handlers.get(&fd).map(Handler::is_listener).unwrap_or(false);
      self.handlers.remove(&fd);
      #[cfg(feature = "tls")]
      self.tls_listeners.remove(&fd);
      if !is_listener {
        self.invoke_guarded(fd, move |client, handle| client.on_close(handle, fd));
      }
    }
  }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(msg) = panic.downcast_ref::<&'static str>() {
    (*msg).to_string()
  } else if let Some(msg) = panic.downcast_ref::<String>() {
    msg.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::TcpStream;

  #[derive(Default)]
  struct RecordingClient {
    opened: Vec<RawFd>,
    read: Vec<(RawFd, Vec<u8>)>,
    closed: Vec<RawFd>,
  }

  impl ReactorClient for RecordingClient {
    fn on_open(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd, _peer: &PeerEndpoint) {
      self.opened.push(fd);
    }

    fn on_read(&mut self, reactor: &mut ReactorHandle<'_>, fd: RawFd, batch: Vec<Vec<u8>>) {
      for buf in batch {
        self.read.push((fd, buf.clone()));
        reactor.write(fd, buf);
      }
    }

    fn on_close(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd) {
      self.closed.push(fd);
    }
  }

  #[test]
  fn echoes_one_buffer_through_the_loop() {
    let mut reactor = Reactor::new(RecordingClient::default());
    let listener_fd = reactor.add_listener("127.0.0.1", 0).expect("bind");
    let port = match reactor.handlers.get(&listener_fd).expect("listener present") {
      Handler::Listener(l) => l.local_port(),
      _ => unreachable!(),
    };

    let mut client = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    client.set_nonblocking(true).expect("nonblocking");

    // Accept + wire up the server-side handler.
    for _ in 0..100 {
      reactor.run_once().expect("run_once");
      if reactor.client.opened.len() == 1 {
        break;
      }
    }
    assert_eq!(reactor.client.opened.len(), 1);

    use std::io::Write;
    client.write_all(b"ping").expect("write");

    let mut echoed = Vec::new();
    for _ in 0..1000 {
      reactor.run_once().expect("run_once");
      use std::io::Read;
      let mut buf = [0u8; 16];
      match client.read(&mut buf) {
        Ok(0) => break,
        Ok(n) => {
          echoed.extend_from_slice(&buf[..n]);
          break;
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
        Err(e) => panic!("client read failed: {e}"),
      }
    }
    assert_eq!(echoed, b"ping");
    assert_eq!(reactor.client.read, vec![(reactor.client.opened[0], b"ping".to_vec())]);
  }
}
