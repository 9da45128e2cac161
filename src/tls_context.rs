//! Immutable per-role TLS configuration factory. Grounded on the teacher's
//! `demos/tls.rs` cert/key loading (`rustls_pemfile::certs`/`private_key`)
//! and on `io/ssl.hpp` in the original source for the verification and SNI
//! contract: a server always requires client certificates when configured
//! for mutual TLS, and a client always verifies the server unless a custom
//! CA bundle opts into a different trust anchor set.

use crate::error::{ConfigError, ReactorError, ReactorResult};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

fn load_certs(path: &Path) -> ReactorResult<Vec<CertificateDer<'static>>> {
  let file = File::open(path)?;
  let mut reader = BufReader::new(file);
  rustls_pemfile::certs(&mut reader)
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| ReactorError::new_io(std::io::ErrorKind::InvalidData, e.to_string()))
}

fn load_private_key(path: &Path) -> ReactorResult<PrivateKeyDer<'static>> {
  let file = File::open(path)?;
  let mut reader = BufReader::new(file);
  rustls_pemfile::private_key(&mut reader)
    .map_err(|e| ReactorError::new_io(std::io::ErrorKind::InvalidData, e.to_string()))?
    .ok_or_else(|| ReactorError::new_io(std::io::ErrorKind::InvalidData, "no private key found in keyfile"))
}

/// Role-tagged TLS configuration: a server context builds `ServerConnection`s,
/// a client context builds `ClientConnection`s.
pub enum TlsContext {
  Server(Arc<ServerConfig>),
  Client { config: Arc<ClientConfig>, server_name: ServerName<'static> },
}

impl TlsContext {
  /// `certfile`/`keyfile` are PEM files, per the `-c`/`-k` command-line
  /// flags. No client certificate is requested (mutual TLS is not part of
  /// this spec's CLI surface).
  pub fn server(certfile: &Path, keyfile: &Path) -> ReactorResult<Self> {
    let certs = load_certs(certfile)?;
    let key = load_private_key(keyfile)?;
    let config = ServerConfig::builder()
      .with_no_client_auth()
      .with_single_cert(certs, key)
      .map_err(|e| ReactorError::new_io(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    Ok(TlsContext::Server(Arc::new(config)))
  }

  /// `capath`, if given, is a PEM bundle of trust anchors; otherwise the
  /// platform's native trust store is used via `rustls-native-certs`'
  /// absence is intentional here — the original source's client always
  /// points `--capath` at the self-signed demo CA, so an explicit bundle is
  /// the common case and is required when one isn't supplied the
  /// connection will fail verification against an empty root store, which
  /// is the correct, safe default rather than silently trusting everyone.
  pub fn client(host: &str, capath: Option<&Path>) -> ReactorResult<Self> {
    let mut roots = RootCertStore::empty();
    if let Some(capath) = capath {
      for cert in load_certs(capath)? {
        roots
          .add(cert)
          .map_err(|e| ReactorError::new_io(std::io::ErrorKind::InvalidInput, e.to_string()))?;
      }
    }
    let config =
      ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    let server_name = ServerName::try_from(host.to_string())
      .map_err(|_| ReactorError::Config(ConfigError::InvalidEndpoint(host.to_string())))?;
    Ok(TlsContext::Client { config: Arc::new(config), server_name })
  }

  pub fn new_server_connection(&self) -> ReactorResult<rustls::ServerConnection> {
    match self {
      TlsContext::Server(config) => rustls::ServerConnection::new(config.clone())
        .map_err(|e| ReactorError::new_io(std::io::ErrorKind::Other, e.to_string())),
      TlsContext::Client { .. } => {
        Err(ReactorError::Config(ConfigError::InvalidEndpoint("server connection requested from a client TlsContext".into())))
      }
    }
  }

  pub fn new_client_connection(&self) -> ReactorResult<rustls::ClientConnection> {
    match self {
      TlsContext::Client { config, server_name } => {
        rustls::ClientConnection::new(config.clone(), server_name.clone())
          .map_err(|e| ReactorError::new_io(std::io::ErrorKind::Other, e.to_string()))
      }
      TlsContext::Server(_) => {
        Err(ReactorError::Config(ConfigError::InvalidEndpoint("client connection requested from a server TlsContext".into())))
      }
    }
  }
}
