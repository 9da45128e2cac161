//! Plain-TCP echo server. Echoes every received buffer back to its sender,
//! except the literal buffer `KILLME`, which closes the connection instead.
//! Grounded on `original_source/10 - Class base Poller with TLS and
//! Signals/echo-server.cpp`.

use clap::Parser;
use log::info;
use rpoll::cli::{CliArgs, HelpLevel, RunConfig};
use rpoll::{PeerEndpoint, Reactor, ReactorClient, ReactorError, ReactorHandle};
use std::os::unix::io::RawFd;
use std::process::ExitCode;

struct EchoServer;

impl ReactorClient for EchoServer {
  fn on_open(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd, peer: &PeerEndpoint) {
    info!("on_open: {peer} (fd {fd})");
  }

  fn on_close(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd) {
    info!("on_close: fd {fd}");
  }

  fn on_read(&mut self, reactor: &mut ReactorHandle<'_>, fd: RawFd, batch: Vec<Vec<u8>>) {
    for buf in batch {
      if buf == b"KILLME" {
        info!("closing fd {fd} on request");
        reactor.close(fd);
        continue;
      }
      reactor.write(fd, buf);
    }
  }

  fn on_error(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd, error: ReactorError) {
    info!("on_error: fd {fd}: {error}");
  }
}

fn print_help(level: HelpLevel) {
  eprintln!("usage: echo_server [-p PORT]");
  if matches!(level, HelpLevel::Advanced | HelpLevel::Expert) {
    eprintln!("  -p, --port <PORT>   port number (default 22000)");
  }
  if level == HelpLevel::Expert {
    eprintln!("  This binary has no TLS support; see echo_server_tls.");
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
    eprintln!("this binary has no TLS support; use echo_server_tls instead");
    return ExitCode::FAILURE;
  }

  info!("starting echo server on port {}", config.port);

  let mut reactor = Reactor::new(EchoServer);
  if let Err(e) = reactor.add_listener("0.0.0.0", config.port) {
    eprintln!("failed to bind port {}: {e}", config.port);
    return ExitCode::FAILURE;
  }

  if let Err(e) = reactor.run() {
    eprintln!("reactor error: {e}");
    return ExitCode::FAILURE;
  }

  info!("server stopped");
  ExitCode::SUCCESS
}
