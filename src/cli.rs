//! Command-line surface shared by the demo binaries. Grounded on the
//! `popl::OptionParser` flag tables in `original_source/10 - Class base
//! Poller with TLS and Signals/echo-server.cpp`, `chat-server.cpp` and
//! `client.cpp`: `-s/--ssl`, a repeatable `--help` for verbosity
//! (`popl::Attribute::{advanced,expert}`), `-p/--port` (default 22000),
//! `-h/--host` (default "localhost", client only), `-c/--certfile`,
//! `-k/--keyfile` (server only), `--capath` (client only).

use crate::error::{ConfigError, ReactorResult};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Raw parsed arguments. `-h` is claimed by `--host`, not `--help` — clap's
/// built-in help flag is disabled so this crate can implement the
/// original's repeat-count verbosity levels instead of a single help page.
#[derive(Debug, Parser)]
#[command(name = "rpoll", disable_help_flag = true, disable_version_flag = true)]
pub struct CliArgs {
  /// Connect/listen with TLS.
  #[arg(short = 's', long)]
  pub ssl: bool,

  /// Repeatable: one gives basic usage, two gives advanced usage, three or
  /// more gives expert usage.
  #[arg(long, action = ArgAction::Count)]
  pub help: u8,

  #[arg(short = 'p', long, default_value_t = 22000)]
  pub port: u16,

  #[arg(short = 'h', long, default_value_t = String::from("localhost"))]
  pub host: String,

  /// Server-side: path to the PEM certificate file. Required with `--ssl`.
  #[arg(short = 'c', long)]
  pub certfile: Option<PathBuf>,

  /// Server-side: path to the PEM private key file. Required with `--ssl`.
  #[arg(short = 'k', long)]
  pub keyfile: Option<PathBuf>,

  /// Client-side: path to a PEM bundle of trust anchors. Omitted means an
  /// empty root store (verification will fail, deliberately — see
  /// `tls_context.rs`).
  #[arg(long)]
  pub capath: Option<PathBuf>,
}

/// Verbosity level requested via a repeated `--help` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpLevel {
  Basic,
  Advanced,
  Expert,
}

impl HelpLevel {
  pub fn from_count(count: u8) -> Option<Self> {
    match count {
      0 => None,
      1 => Some(HelpLevel::Basic),
      2 => Some(HelpLevel::Advanced),
      _ => Some(HelpLevel::Expert),
    }
  }
}

/// Validated TLS half of a [`RunConfig`].
#[derive(Debug, Clone)]
pub struct TlsEndpointConfig {
  pub certfile: PathBuf,
  pub keyfile: PathBuf,
  pub capath: Option<PathBuf>,
}

/// Fully validated run configuration, independent of which demo binary
/// consumes it.
#[derive(Debug, Clone)]
pub struct RunConfig {
  pub host: String,
  pub port: u16,
  pub tls: Option<TlsEndpointConfig>,
}

impl RunConfig {
  /// Validates the parsed arguments for **server** use: `--ssl` requires
  /// both `--certfile` and `--keyfile`.
  pub fn for_server(args: &CliArgs) -> ReactorResult<Self> {
    let tls = if args.ssl {
      let certfile = args.certfile.clone().ok_or(ConfigError::MissingCertFile)?;
      let keyfile = args.keyfile.clone().ok_or(ConfigError::MissingKeyFile)?;
      Some(TlsEndpointConfig { certfile, keyfile, capath: args.capath.clone() })
    } else {
      None
    };
    Ok(Self { host: args.host.clone(), port: args.port, tls })
  }

  /// Validates the parsed arguments for **client** use: TLS needs no
  /// cert/key, only the optional `--capath` trust bundle.
  pub fn for_client(args: &CliArgs) -> ReactorResult<Self> {
    let tls = args.ssl.then(|| TlsEndpointConfig {
      certfile: PathBuf::new(),
      keyfile: PathBuf::new(),
      capath: args.capath.clone(),
    });
    Ok(Self { host: args.host.clone(), port: args.port, tls })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn server_rejects_ssl_without_certfile() {
    let args = CliArgs { ssl: true, help: 0, port: 22000, host: "localhost".into(), certfile: None, keyfile: None, capath: None };
    let err = RunConfig::for_server(&args).expect_err("missing certfile should fail");
    assert!(err.downcast_ref::<ConfigError>().is_some());
  }

  #[test]
  fn server_accepts_ssl_with_both_files() {
    let args = CliArgs {
      ssl: true,
      help: 0,
      port: 22000,
      host: "localhost".into(),
      certfile: Some(PathBuf::from("cert.pem")),
      keyfile: Some(PathBuf::from("key.pem")),
      capath: None,
    };
    let config = RunConfig::for_server(&args).expect("valid config");
    assert!(config.tls.is_some());
  }

  #[test]
  fn help_levels_escalate_with_repeat_count() {
    assert_eq!(HelpLevel::from_count(0), None);
    assert_eq!(HelpLevel::from_count(1), Some(HelpLevel::Basic));
    assert_eq!(HelpLevel::from_count(2), Some(HelpLevel::Advanced));
    assert_eq!(HelpLevel::from_count(5), Some(HelpLevel::Expert));
  }
}
