//! Plain-TCP chat server: every buffer received from one client is
//! rebroadcast to every other connected client. Grounded on
//! `original_source/10 - Class base Poller with TLS and
//! Signals/chat-server.cpp`.

use clap::Parser;
use log::info;
use rpoll::cli::{CliArgs, HelpLevel, RunConfig};
use rpoll::{PeerEndpoint, Reactor, ReactorClient, ReactorError, ReactorHandle};
use std::collections::HashSet;
use std::os::unix::io::RawFd;
use std::process::ExitCode;

#[derive(Default)]
struct ChatServer {
  clients: HashSet<RawFd>,
}

impl ReactorClient for ChatServer {
  fn on_open(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd, peer: &PeerEndpoint) {
    info!("adding client {peer} (fd {fd})");
    self.clients.insert(fd);
  }

  fn on_close(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd) {
    info!("removing client fd {fd}");
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

  fn on_error(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd, error: ReactorError) {
    info!("on_error: fd {fd}: {error}");
  }
}

fn print_help(level: HelpLevel) {
  eprintln!("usage: chat_server [-p PORT]");
  if level == HelpLevel::Expert {
    eprintln!("  Every line a client sends is rebroadcast to all other clients.");
  }
}

fn main() -> ExitCode {
  let args = CliArgs::parse();
  if let Some(level) = HelpLevel::from_count(args.help) {
    print_help(level);
    return ExitCode::FAILURE;
  }

  rpoll::logging::init();

  let config = match RunConfig::for_server(&args) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{e}");
      return ExitCode::FAILURE;
    }
  };
  if config.tls.is_some() {
    eprintln!("this binary has no TLS support");
    return ExitCode::FAILURE;
  }

  info!("starting chat server on port {}", config.port);

  let mut reactor = Reactor::new(ChatServer::default());
  if let Err(e) = reactor.add_listener("0.0.0.0", config.port) {
    eprintln!("failed to bind port {}: {e}", config.port);
    return ExitCode::FAILURE;
  }

  if let Err(e) = reactor.run() {
    eprintln!("reactor error: {e}");
    return ExitCode::FAILURE;
  }

  ExitCode::SUCCESS
}
