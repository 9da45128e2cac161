//! TLS context construction surfaces clear errors for bad input. The live
//! handshake round trip lives in `tests/tls_roundtrip.rs`, driven off the
//! fixture cert/key pair in `tests/fixtures/`.

#![cfg(feature = "tls")]

use rpoll::TlsContext;
use std::io::Write;
use std::path::Path;

#[test]
fn server_context_rejects_missing_certfile() {
  let err = TlsContext::server(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
    .expect_err("missing certfile must fail");
  let _ = err.to_string();
}

#[test]
fn server_context_rejects_invalid_pem_content() {
  let dir = std::env::temp_dir().join(format!("rpoll-tls-test-{}", std::process::id()));
  std::fs::create_dir_all(&dir).expect("create temp dir");
  let certfile = dir.join("cert.pem");
  let keyfile = dir.join("key.pem");
  std::fs::File::create(&certfile).expect("create certfile").write_all(b"not a certificate").unwrap();
  std::fs::File::create(&keyfile).expect("create keyfile").write_all(b"not a key").unwrap();

  let result = TlsContext::server(&certfile, &keyfile);
  assert!(result.is_err(), "garbage PEM content must not produce a usable server context");

  let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn client_context_requires_a_valid_server_name() {
  let err = TlsContext::client("not a valid dns name!!", None).expect_err("invalid SNI name must fail");
  let _ = err.to_string();
}
