//! End-to-end chat broadcast: a buffer sent by one client is rebroadcast to
//! every other connected client, and never echoed back to the sender.

use rpoll::{PeerEndpoint, Reactor, ReactorClient, ReactorHandle};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::RawFd;

#[derive(Default)]
struct Chat {
  clients: HashSet<RawFd>,
}

impl ReactorClient for Chat {
  fn on_open(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd, _peer: &PeerEndpoint) {
    self.clients.insert(fd);
  }

  fn on_close(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd) {
    self.clients.remove(&fd);
  }

  fn on_read(&mut self, reactor: &mut ReactorHandle<'_>, fd: RawFd, batch: Vec<Vec<u8>>) {
    for buf in batch {
      for &client_fd in &self.clients {
        if client_fd != fd {
          reactor.write(client_fd, buf.clone());
        }
      }
    }
  }
}

fn free_port() -> u16 {
  TcpListener::bind("127.0.0.1:0").expect("bind ephemeral").local_addr().expect("local_addr").port()
}

fn read_available(stream: &mut TcpStream) -> Vec<u8> {
  let mut out = Vec::new();
  let mut buf = [0u8; 64];
  loop {
    match stream.read(&mut buf) {
      Ok(0) => break,
      Ok(n) => out.extend_from_slice(&buf[..n]),
      Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
      Err(e) => panic!("read failed: {e}"),
    }
  }
  out
}

#[test]
fn message_reaches_other_clients_but_not_the_sender() {
  let port = free_port();
  let mut reactor = Reactor::new(Chat::default());
  reactor.add_listener("127.0.0.1", port).expect("bind listener");

  let mut alice = TcpStream::connect(("127.0.0.1", port)).expect("connect alice");
  alice.set_nonblocking(true).expect("nonblocking");
  let mut bob = TcpStream::connect(("127.0.0.1", port)).expect("connect bob");
  bob.set_nonblocking(true).expect("nonblocking");

  for _ in 0..200 {
    reactor.run_once().expect("run_once");
  }

  alice.write_all(b"hi bob").expect("write");

  let mut bob_saw = Vec::new();
  for _ in 0..2000 {
    reactor.run_once().expect("run_once");
    bob_saw.extend(read_available(&mut bob));
    if !bob_saw.is_empty() {
      break;
    }
  }
  assert_eq!(bob_saw, b"hi bob");
  assert!(read_available(&mut alice).is_empty(), "sender must not receive its own message back");
}
