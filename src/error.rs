//! Error stuff.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io;
use std::io::ErrorKind;

pub type ReactorResult<T> = Result<T, ReactorError>;

/// Configuration problems detected while assembling a [`crate::cli::RunConfig`]
/// or a [`crate::tls_context::TlsContext`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
  MissingCertFile,
  MissingKeyFile,
  InvalidPort(String),
  InvalidEndpoint(String),
  HelpRequested,
}

impl Display for ConfigError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      ConfigError::MissingCertFile => write!(f, "--ssl requires --certfile"),
      ConfigError::MissingKeyFile => write!(f, "--ssl requires --keyfile"),
      ConfigError::InvalidPort(p) => write!(f, "invalid port: {p}"),
      ConfigError::InvalidEndpoint(e) => write!(f, "invalid host:port endpoint: {e}"),
      ConfigError::HelpRequested => write!(f, "help requested"),
    }
  }
}
impl Error for ConfigError {}

/// TLS handshake or verification failed for a single connection.
#[derive(Debug)]
#[non_exhaustive]
pub enum TlsError {
  Handshake(String),
  Verification(String),
}

impl Display for TlsError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      TlsError::Handshake(msg) => write!(f, "TLS handshake failed: {msg}"),
      TlsError::Verification(msg) => write!(f, "TLS peer verification failed: {msg}"),
    }
  }
}
impl Error for TlsError {}

/// The crate's unified error type. Follows the teacher crate's `TiiError`
/// shape: one variant per error domain, a `kind()` projection to
/// `io::ErrorKind`, and a blanket `From` that downcasts known variants out of
/// a type-erased box before falling back to `Other`.
#[derive(Debug)]
#[non_exhaustive]
pub enum ReactorError {
  Io(io::Error),
  Config(ConfigError),
  Tls(TlsError),
  Resolve(String),
  Other(Box<dyn Error + Send + Sync>),
}

impl ReactorError {
  pub fn new_io<E: Into<Box<dyn Error + Send + Sync>>>(kind: ErrorKind, message: E) -> Self {
    io::Error::new(kind, message).into()
  }

  pub fn from_io_kind(kind: ErrorKind) -> Self {
    io::Error::from(kind).into()
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      ReactorError::Io(io) => io.kind(),
      ReactorError::Resolve(_) => ErrorKind::NotFound,
      ReactorError::Tls(_) => ErrorKind::InvalidData,
      ReactorError::Config(_) => ErrorKind::InvalidInput,
      ReactorError::Other(_) => ErrorKind::Other,
    }
  }

  /// True for the transport-level "would need to wait" outcome, as opposed
  /// to a real fault. Streams never construct a `ReactorError` for this
  /// case (see `stream::ReadStatus`/`WriteStatus`); this helper exists for
  /// callers that only have an `io::Error` in hand (e.g. from
  /// `rustls::Connection::read_tls`).
  pub fn is_would_block(err: &io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
  }

  pub fn downcast_ref<T: Error + Send + 'static>(&self) -> Option<&T> {
    match self {
      ReactorError::Io(err) => (err as &dyn Error).downcast_ref::<T>(),
      ReactorError::Config(err) => (err as &dyn Error).downcast_ref::<T>(),
      ReactorError::Tls(err) => (err as &dyn Error).downcast_ref::<T>(),
      ReactorError::Resolve(_) => None,
      ReactorError::Other(other) => other.downcast_ref::<T>(),
    }
  }

  pub fn into_inner(self) -> Box<dyn Error + Send + Sync + 'static> {
    match self {
      ReactorError::Io(err) => Box::new(err),
      ReactorError::Config(err) => Box::new(err),
      ReactorError::Tls(err) => Box::new(err),
      ReactorError::Resolve(msg) => Box::new(io::Error::new(ErrorKind::NotFound, msg)),
      ReactorError::Other(other) => other,
    }
  }
}

impl Display for ReactorError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      ReactorError::Io(err) => Display::fmt(err, f),
      ReactorError::Config(err) => Display::fmt(err, f),
      ReactorError::Tls(err) => Display::fmt(err, f),
      ReactorError::Resolve(msg) => write!(f, "address resolution failed: {msg}"),
      ReactorError::Other(err) => Display::fmt(err, f),
    }
  }
}

impl<T> From<T> for ReactorError
where
  T: Error + Send + Sync + 'static,
{
  fn from(value: T) -> Self {
    let mut dyn_box = Box::new(value) as Box<dyn Error + Send + Sync>;
    dyn_box = match dyn_box.downcast::<io::Error>() {
      Ok(err) => return ReactorError::Io(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<ConfigError>() {
      Ok(err) => return ReactorError::Config(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<TlsError>() {
      Ok(err) => return ReactorError::Tls(*err),
      Err(err) => err,
    };

    ReactorError::Other(dyn_box)
  }
}

impl From<ReactorError> for io::Error {
  fn from(value: ReactorError) -> Self {
    match value {
      ReactorError::Io(io) => io,
      err => io::Error::new(err.kind(), err.into_inner()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn io_error_roundtrips_through_downcast() {
    let err: ReactorError = io::Error::from(ErrorKind::BrokenPipe).into();
    assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    assert!(matches!(err, ReactorError::Io(_)));
  }

  #[test]
  fn config_error_carries_its_own_kind() {
    let err: ReactorError = ConfigError::MissingCertFile.into();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(err.downcast_ref::<ConfigError>().is_some());
  }

  #[test]
  fn unknown_error_falls_back_to_other() {
    #[derive(Debug)]
    struct Weird;
    impl Display for Weird {
      fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "weird")
      }
    }
    impl Error for Weird {}

    let err: ReactorError = Weird.into();
    assert!(matches!(err, ReactorError::Other(_)));
  }
}
