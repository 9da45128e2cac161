//! A single-threaded, non-blocking TCP reactor with optional TLS. One
//! `poll(2)` loop multiplexes a listener and any number of connections,
//! each optionally wrapped in TLS, behind a uniform buffered byte-stream
//! interface delivered to a small set of application callbacks
//! (`on_startup`, `on_interrupt`, `on_open`, `on_close`, `on_read`,
//! `on_error`).

#![warn(missing_docs)]

pub mod endpoint;
pub mod error;
pub mod fd;
pub mod handler;
pub mod listener;
#[cfg(feature = "cli")]
pub mod logging;
pub mod reactor;
pub mod stream;

#[cfg(feature = "tls")]
pub mod tls_context;

#[cfg(feature = "cli")]
pub mod cli;

mod util;

pub use endpoint::{EndpointParseError, PeerEndpoint};
pub use error::{ConfigError, ReactorError, ReactorResult, TlsError};
pub use handler::FileDirection;
pub use reactor::{install_sigint_handler, Reactor, ReactorClient, ReactorHandle};
pub use stream::{ReadStatus, Stream, WriteStatus};

#[cfg(feature = "tls")]
pub use tls_context::TlsContext;
