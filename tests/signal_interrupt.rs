//! A `SIGINT` delivered between `poll(2)` calls surfaces as exactly one
//! `on_interrupt` callback, and the loop keeps running afterward unless the
//! callback requests a stop.

use rpoll::{install_sigint_handler, Reactor, ReactorClient, ReactorHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default, Clone)]
struct CountsInterrupts {
  interrupts: Arc<AtomicUsize>,
}

impl ReactorClient for CountsInterrupts {
  fn on_interrupt(&mut self, _reactor: &mut ReactorHandle<'_>) {
    self.interrupts.fetch_add(1, Ordering::SeqCst);
  }
}

#[test]
fn sigint_is_delivered_as_on_interrupt() {
  install_sigint_handler().expect("install handler");

  let client = CountsInterrupts::default();
  let mut reactor = Reactor::new(client.clone());

  // SAFETY: raising a signal this process already installed a handler for.
  unsafe {
    libc::raise(libc::SIGINT);
  }

  reactor.run_once().expect("run_once");

  assert_eq!(client.interrupts.load(Ordering::SeqCst), 1);

  // A second iteration with no further signal must not re-fire on_interrupt.
  reactor.run_once().expect("run_once");
  assert_eq!(client.interrupts.load(Ordering::SeqCst), 1);
}
