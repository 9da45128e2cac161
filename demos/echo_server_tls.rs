//! TLS-wrapped echo server. Identical behaviour to `echo_server`, but every
//! accepted connection is wrapped in a server-side TLS handshake. Grounded
//! on `original_source/10 - Class base Poller with TLS and
//! Signals/echo-server.cpp`'s `make_ssl_context` branch.

use clap::Parser;
use log::info;
use rpoll::cli::{CliArgs, HelpLevel, RunConfig};
use rpoll::{PeerEndpoint, Reactor, ReactorClient, ReactorError, ReactorHandle, TlsContext};
use std::os::unix::io::RawFd;
use std::process::ExitCode;
use std::sync::Arc;

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
  eprintln!("usage: echo_server_tls -c CERTFILE -k KEYFILE [-p PORT]");
  if matches!(level, HelpLevel::Advanced | HelpLevel::Expert) {
    eprintln!("  -c, --certfile <PATH>   PEM certificate chain");
    eprintln!("  -k, --keyfile <PATH>    PEM private key");
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
  let Some(tls) = config.tls.as_ref() else {
    eprintln!("this binary requires --ssl with --certfile and --keyfile");
    return ExitCode::FAILURE;
  };

  let context = match TlsContext::server(&tls.certfile, &tls.keyfile) {
    Ok(context) => Arc::new(context),
    Err(e) => {
      eprintln!("failed to build TLS server context: {e}");
      return ExitCode::FAILURE;
    }
  };

  info!("starting TLS echo server on port {}", config.port);

  let mut reactor = Reactor::new(EchoServer);
  if let Err(e) = reactor.add_tls_listener("0.0.0.0", config.port, context) {
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
