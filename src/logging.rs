//! Environment-driven logging bootstrap for the demo binaries.
//!
//! Mirrors the original source's per-logger verbosity knobs
//! (`LOGGER_LEVEL`, `LOGGER_LEVEL_<NAME>`) on top of the `log` facade the
//! rest of the crate already targets via `trace_log!`/`debug_log!`/etc.
//! Installed with `env_logger`, the same backend crate the wider example
//! pack reaches for when it needs more than the facade.

use log::LevelFilter;

const VAR_PREFIX: &str = "LOGGER_LEVEL";

fn parse_level(raw: &str) -> Option<LevelFilter> {
  match raw.to_ascii_uppercase().as_str() {
    "NONE" => Some(LevelFilter::Off),
    "CRITICAL" => Some(LevelFilter::Error),
    "ERROR" => Some(LevelFilter::Error),
    "WARNING" | "WARN" => Some(LevelFilter::Warn),
    "INFO" => Some(LevelFilter::Info),
    "DEBUG" => Some(LevelFilter::Debug),
    "TRACE" => Some(LevelFilter::Trace),
    _ => None,
  }
}

/// Reads `LOGGER_LEVEL` and any `LOGGER_LEVEL_<NAME>` overrides from the
/// environment and installs them as an `env_logger` filter. Unrecognized
/// level names are ignored (the default level applies instead).
pub fn init() {
  let mut builder = env_logger::Builder::new();

  let default_level = std::env::var("LOGGER_LEVEL")
    .ok()
    .and_then(|v| parse_level(&v))
    .unwrap_or(LevelFilter::Info);
  builder.filter_level(default_level);

  for (key, value) in std::env::vars() {
    let Some(name) = key.strip_prefix(VAR_PREFIX) else { continue };
    let Some(name) = name.strip_prefix('_') else { continue };
    if name.is_empty() {
      continue;
    }
    if let Some(level) = parse_level(&value) {
      builder.filter_module(name, level);
    }
  }

  // In test binaries a logger may already be installed by an earlier test;
  // ignore the "already initialized" error rather than panicking.
  let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognizes_all_documented_levels() {
    assert_eq!(parse_level("none"), Some(LevelFilter::Off));
    assert_eq!(parse_level("CRITICAL"), Some(LevelFilter::Error));
    assert_eq!(parse_level("Warning"), Some(LevelFilter::Warn));
    assert_eq!(parse_level("trace"), Some(LevelFilter::Trace));
    assert_eq!(parse_level("bogus"), None);
  }
}
