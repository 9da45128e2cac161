//! Interactive client: stdin is forwarded to the server, the server's
//! replies are forwarded to stdout, and the literal line `CLOSE\n` on
//! stdin closes the connection. Grounded on `original_source/10 - Class
//! base Poller with TLS and Signals/client.cpp`.

use clap::Parser;
use log::info;
use rpoll::cli::{CliArgs, HelpLevel, RunConfig};
use rpoll::fd::FileDescriptor;
use rpoll::stream::PlainStream;
#[cfg(feature = "tls")]
use rpoll::stream::TlsStream;
#[cfg(feature = "tls")]
use rpoll::TlsContext;
use rpoll::{FileDirection, PeerEndpoint, Reactor, ReactorClient, ReactorError, ReactorHandle, Stream};
use std::net::TcpStream;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::process::ExitCode;

const STDIN_FD: RawFd = libc::STDIN_FILENO;
const STDOUT_FD: RawFd = libc::STDOUT_FILENO;

struct Client {
  client_fd: RawFd,
}

impl ReactorClient for Client {
  fn on_open(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd, _peer: &PeerEndpoint) {
    info!("on_open: fd {fd}");
  }

  fn on_close(&mut self, reactor: &mut ReactorHandle<'_>, fd: RawFd) {
    info!("on_close: fd {fd}");
    if fd == self.client_fd {
      reactor.request_stop();
    }
  }

  fn on_read(&mut self, reactor: &mut ReactorHandle<'_>, fd: RawFd, batch: Vec<Vec<u8>>) {
    for buf in batch {
      if fd == STDIN_FD {
        if buf == b"CLOSE\n" {
          reactor.close(self.client_fd);
        } else {
          reactor.write(self.client_fd, buf);
        }
      } else if fd == self.client_fd {
        reactor.write(STDOUT_FD, buf);
      }
    }
  }

  fn on_error(&mut self, _reactor: &mut ReactorHandle<'_>, fd: RawFd, error: ReactorError) {
    info!("on_error: fd {fd}: {error}");
  }
}

fn print_help(level: HelpLevel) {
  eprintln!("usage: client [-h HOST] [-p PORT] [-s] [--capath PATH]");
  if level == HelpLevel::Expert {
    eprintln!("  Lines typed on stdin are sent to the server; the literal line");
    eprintln!("  \"CLOSE\" closes the connection. Server replies print to stdout.");
    eprintln!("  -s, --ssl           connect over TLS");
    eprintln!("  --capath <PATH>     PEM bundle of trust anchors for server verification");
  }
}

/// Wraps the connected socket in a `Stream`, establishing a TLS client
/// connection when `config.tls` is set. Grounded on `client.cpp`'s
/// `make_ssl_context` + `SSL_connect` branch.
fn build_client_stream(config: &RunConfig, stream: TcpStream) -> Result<Stream, String> {
  match &config.tls {
    Some(tls) => {
      #[cfg(feature = "tls")]
      {
        let context = TlsContext::client(&config.host, tls.capath.as_deref())
          .map_err(|e| format!("failed to build TLS client context: {e}"))?;
        let conn =
          context.new_client_connection().map_err(|e| format!("failed to start TLS handshake: {e}"))?;
        Ok(Stream::Tls(Box::new(TlsStream::new_client(FileDescriptor::new(stream.into_raw_fd()), conn, false))))
      }
      #[cfg(not(feature = "tls"))]
      {
        let _ = tls;
        Err("this binary was built without TLS support (rebuild with --features tls)".to_string())
      }
    }
    None => Ok(Stream::Plain(PlainStream::from_fd(FileDescriptor::new(stream.into_raw_fd())))),
  }
}

fn main() -> ExitCode {
  let args = CliArgs::parse();
  if let Some(level) = HelpLevel::from_count(args.help) {
    print_help(level);
    return ExitCode::FAILURE;
  }

  rpoll::logging::init();

  let config = match RunConfig::for_client(&args) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{e}");
      return ExitCode::FAILURE;
    }
  };
  info!("connecting to host {} on port {}", config.host, config.port);
  let stream = match TcpStream::connect((config.host.as_str(), config.port)) {
    Ok(stream) => stream,
    Err(e) => {
      eprintln!("failed to connect to {}:{}: {e}", config.host, config.port);
      return ExitCode::FAILURE;
    }
  };
  if let Err(e) = stream.set_nonblocking(true) {
    eprintln!("failed to set socket non-blocking: {e}");
    return ExitCode::FAILURE;
  }
  if let Err(e) = rpoll::fd::set_nonblocking_raw(STDIN_FD, true) {
    eprintln!("failed to set stdin non-blocking: {e}");
    return ExitCode::FAILURE;
  }

  let peer = PeerEndpoint::new(config.host.clone(), config.port);
  let client_stream = match build_client_stream(&config, stream) {
    Ok(stream) => stream,
    Err(e) => {
      eprintln!("{e}");
      return ExitCode::FAILURE;
    }
  };
  let client_fd = client_stream.raw_fd();

  let mut reactor = Reactor::new(Client { client_fd });
  reactor.add_connection(client_stream, peer);
  reactor.add_file_handler(STDIN_FD, FileDirection::ReadOnly);
  reactor.add_file_handler(STDOUT_FD, FileDirection::WriteOnly);

  if let Err(e) = reactor.run() {
    eprintln!("reactor error: {e}");
    return ExitCode::FAILURE;
  }

  ExitCode::SUCCESS
}
