//! `host:port` endpoint value type, grounded on `io/endpoint.hpp` in the
//! original source, used both for accepted-peer bookkeeping and for parsing
//! the interactive client's destination argument.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerEndpoint {
  pub host: String,
  pub port: u16,
}

impl PeerEndpoint {
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self { host: host.into(), port }
  }
}

impl Display for PeerEndpoint {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

#[derive(Debug)]
pub struct EndpointParseError(pub String);

impl Display for EndpointParseError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "invalid host:port endpoint: {}", self.0)
  }
}
impl std::error::Error for EndpointParseError {}

impl FromStr for PeerEndpoint {
  type Err = EndpointParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (host, port) =
      s.rsplit_once(':').ok_or_else(|| EndpointParseError(s.to_string()))?;
    if host.is_empty() {
      return Err(EndpointParseError(s.to_string()));
    }
    let port: u16 = port.parse().map_err(|_| EndpointParseError(s.to_string()))?;
    Ok(PeerEndpoint::new(host, port))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_host_and_port() {
    let ep: PeerEndpoint = "localhost:22000".parse().expect("parse");
    assert_eq!(ep.host, "localhost");
    assert_eq!(ep.port, 22000);
  }

  #[test]
  fn rejects_missing_port() {
    assert!("localhost".parse::<PeerEndpoint>().is_err());
  }

  #[test]
  fn rejects_empty_host() {
    assert!(":22000".parse::<PeerEndpoint>().is_err());
  }

  #[test]
  fn display_matches_original_form() {
    let ep = PeerEndpoint::new("example.com", 443);
    assert_eq!(ep.to_string(), "example.com:443");
  }
}
